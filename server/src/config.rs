use std::io;
use std::time::Duration;

pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(30);
pub const DEFAULT_CONTROL_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;
pub const DEFAULT_SESSION_INBOX: usize = 64;
pub const DEFAULT_RATE_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_RATE_BURST: u32 = 16;

/// Server settings. `main` fills these from the command line.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: String,
    /// Interval between pings. Writes and pongs must complete within two.
    pub heartbeat: Duration,
    /// Upper bound for sending a close frame.
    pub control_timeout: Duration,
    /// Outbound events buffered per connection before it is dropped.
    pub queue_capacity: usize,
    /// Commands buffered per session.
    pub session_inbox: usize,
    /// One command token is refilled per interval.
    pub rate_interval: Duration,
    pub rate_burst: u32,
}

impl ServerConfig {
    pub fn write_timeout(&self) -> Duration {
        self.heartbeat * 2
    }

    pub fn read_deadline(&self) -> Duration {
        self.heartbeat * 2
    }

    /// Rejects settings the connection loops cannot run with.
    pub fn validate(&self) -> io::Result<()> {
        let invalid = |what: &str| -> io::Result<()> {
            Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} must be greater than zero", what),
            ))
        };

        if self.heartbeat.is_zero() {
            return invalid("heartbeat");
        }
        if self.control_timeout.is_zero() {
            return invalid("control timeout");
        }
        if self.queue_capacity == 0 {
            return invalid("queue capacity");
        }
        if self.session_inbox == 0 {
            return invalid("session inbox");
        }
        if self.rate_burst == 0 {
            return invalid("rate burst");
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8080".to_string(),
            heartbeat: DEFAULT_HEARTBEAT,
            control_timeout: DEFAULT_CONTROL_TIMEOUT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            session_inbox: DEFAULT_SESSION_INBOX,
            rate_interval: DEFAULT_RATE_INTERVAL,
            rate_burst: DEFAULT_RATE_BURST,
        }
    }
}
