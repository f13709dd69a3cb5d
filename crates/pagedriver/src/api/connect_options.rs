use std::time::Duration;

/// Options for [`Browser::connect`].
///
/// The polling intervals and deadlines used by the wait helpers are
/// deliberately configurable; the defaults match what interactive automation
/// tolerates well in practice.
///
/// [`Browser::connect`]: crate::Browser::connect
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Host of the debugging endpoint.
    pub host: String,
    /// Port the browser was started with (`--remote-debugging-port`).
    pub port: u16,
    /// Delay before the first readiness poll after a navigation call.
    pub load_poll_initial_delay: Duration,
    /// Interval between readiness polls.
    pub load_poll_interval: Duration,
    /// Deadline for `wait_for_load`. Expiry is silent.
    pub load_timeout: Duration,
    /// Interval between `wait_for` condition polls.
    pub wait_for_poll_interval: Duration,
    /// Deadline for `download_via_click` to observe a completed download.
    pub download_timeout: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9222,
            load_poll_initial_delay: Duration::from_millis(50),
            load_poll_interval: Duration::from_millis(150),
            load_timeout: Duration::from_secs(30),
            wait_for_poll_interval: Duration::from_millis(500),
            download_timeout: Duration::from_secs(60),
        }
    }
}

impl ConnectOptions {
    /// Creates a new `ConnectOptions` with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the debugging endpoint host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the debugging endpoint port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the deadline for navigation readiness waits.
    pub fn load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = timeout;
        self
    }

    /// Set the interval between readiness polls.
    pub fn load_poll_interval(mut self, interval: Duration) -> Self {
        self.load_poll_interval = interval;
        self
    }

    /// Set the delay before the first readiness poll.
    pub fn load_poll_initial_delay(mut self, delay: Duration) -> Self {
        self.load_poll_initial_delay = delay;
        self
    }

    /// Set the interval between `wait_for` condition polls.
    pub fn wait_for_poll_interval(mut self, interval: Duration) -> Self {
        self.wait_for_poll_interval = interval;
        self
    }

    /// Set the download completion deadline.
    pub fn download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = ConnectOptions::default();
        assert_eq!(opts.host, "127.0.0.1");
        assert_eq!(opts.port, 9222);
        assert_eq!(opts.load_timeout, Duration::from_secs(30));
        assert_eq!(opts.load_poll_interval, Duration::from_millis(150));
        assert_eq!(opts.download_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_builder_chain() {
        let opts = ConnectOptions::new()
            .host("localhost")
            .port(9333)
            .load_timeout(Duration::from_secs(5))
            .download_timeout(Duration::from_secs(10));
        assert_eq!(opts.host, "localhost");
        assert_eq!(opts.port, 9333);
        assert_eq!(opts.load_timeout, Duration::from_secs(5));
        assert_eq!(opts.download_timeout, Duration::from_secs(10));
    }
}
