//! Serial port transport
//!
//! Opens a tty device in raw mode with `libc`, in the same style as a raw HCI
//! socket: one file descriptor, non-blocking reads driven by `FIONREAD`, and the
//! descriptor closed on drop.

use crate::error::HciError;
use crate::hci::transport::Transport;
use std::ffi::CString;
use std::os::unix::io::{AsRawFd, RawFd};

/// Serial port settings
#[derive(Debug, Clone)]
pub struct UartConfig {
    /// Device path, e.g. `/dev/ttyUSB0`
    pub path: String,
    pub baud_rate: u32,
}

impl Default for UartConfig {
    fn default() -> Self {
        Self {
            path: "/dev/ttyACM0".to_string(),
            baud_rate: 115_200,
        }
    }
}

/// A controller attached to a serial port
#[derive(Debug)]
pub struct UartTransport {
    fd: RawFd,
}

fn baud_constant(baud_rate: u32) -> Result<libc::speed_t, HciError> {
    let speed = match baud_rate {
        9_600 => libc::B9600,
        19_200 => libc::B19200,
        38_400 => libc::B38400,
        57_600 => libc::B57600,
        115_200 => libc::B115200,
        230_400 => libc::B230400,
        #[cfg(target_os = "linux")]
        460_800 => libc::B460800,
        #[cfg(target_os = "linux")]
        921_600 => libc::B921600,
        #[cfg(target_os = "linux")]
        1_000_000 => libc::B1000000,
        other => {
            return Err(HciError::Transport(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("unsupported baud rate {}", other),
            )))
        }
    };
    Ok(speed)
}

impl UartTransport {
    /// Opens the serial device and switches it to raw mode
    pub fn open(config: &UartConfig) -> Result<Self, HciError> {
        let path = CString::new(config.path.as_str()).map_err(|_| {
            HciError::Transport(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "device path contains a NUL byte",
            ))
        })?;
        let speed = baud_constant(config.baud_rate)?;

        let fd = unsafe {
            libc::open(
                path.as_ptr(),
                libc::O_RDWR | libc::O_NOCTTY | libc::O_NONBLOCK,
            )
        };
        if fd < 0 {
            return Err(HciError::Transport(std::io::Error::last_os_error()));
        }

        // Construct first so the descriptor is closed on any error below
        let transport = UartTransport { fd };

        let mut tty: libc::termios = unsafe { std::mem::zeroed() };
        if unsafe { libc::tcgetattr(fd, &mut tty) } < 0 {
            return Err(HciError::Transport(std::io::Error::last_os_error()));
        }

        unsafe {
            libc::cfmakeraw(&mut tty);
            libc::cfsetispeed(&mut tty, speed);
            libc::cfsetospeed(&mut tty, speed);
        }
        tty.c_cflag |= libc::CLOCAL | libc::CREAD;

        if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &tty) } < 0 {
            return Err(HciError::Transport(std::io::Error::last_os_error()));
        }

        Ok(transport)
    }
}

impl AsRawFd for UartTransport {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl Transport for UartTransport {
    fn bytes_available(&mut self) -> Result<usize, HciError> {
        let mut available: libc::c_int = 0;
        let result = unsafe { libc::ioctl(self.fd, libc::FIONREAD, &mut available as *mut libc::c_int) };
        if result < 0 {
            return Err(HciError::Transport(std::io::Error::last_os_error()));
        }
        Ok(available.max(0) as usize)
    }

    fn read_byte(&mut self) -> Result<u8, HciError> {
        let mut byte = 0u8;
        let n = unsafe { libc::read(self.fd, &mut byte as *mut u8 as *mut libc::c_void, 1) };
        match n {
            1 => Ok(byte),
            0 => Err(HciError::Transport(std::io::ErrorKind::UnexpectedEof.into())),
            _ => Err(HciError::Transport(std::io::Error::last_os_error())),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, HciError> {
        let mut written = 0;
        while written < data.len() {
            let remaining = &data[written..];
            let n = unsafe {
                libc::write(
                    self.fd,
                    remaining.as_ptr() as *const libc::c_void,
                    remaining.len(),
                )
            };
            if n < 0 {
                let err = std::io::Error::last_os_error();
                if err.kind() == std::io::ErrorKind::WouldBlock {
                    std::thread::yield_now();
                    continue;
                }
                return Err(HciError::Transport(err));
            }
            written += n as usize;
        }
        Ok(written)
    }
}

impl Drop for UartTransport {
    fn drop(&mut self) {
        unsafe { libc::close(self.fd) };
    }
}
