//! HTTP/2 flow control
//!
//! One [`FlowController`] owns the window pair for a single flow-control
//! scope (the connection, or one stream): `local_window` is the credit we
//! have advertised to the peer for inbound DATA, `remote_window` is the
//! credit the peer has advertised to us for outbound DATA (RFC 7540
//! Section 5.2).

use crate::error::{Error, Result};

/// Largest legal window value (2^31 - 1)
const MAX_WINDOW_SIZE: i64 = 0x7FFF_FFFF;

/// Flow control window pair for one scope.
///
/// Arithmetic is signed: a remote window may go negative transiently when
/// the peer shrinks INITIAL_WINDOW_SIZE on open streams.
#[derive(Debug, Clone)]
pub struct FlowController {
    initial_local: u32,
    initial_remote: u32,
    local_window: i64,
    remote_window: i64,
    local_step: u32,
}

impl FlowController {
    /// Create a controller with both windows at `initial` bytes
    pub fn new(initial_local: u32, initial_remote: u32) -> Self {
        FlowController {
            initial_local,
            initial_remote,
            local_window: initial_local as i64,
            remote_window: initial_remote as i64,
            local_step: initial_local,
        }
    }

    /// Reset the local (receive) window to a new initial size
    pub fn init_local_window(&mut self, size: u32) {
        self.initial_local = size;
        self.local_window = size as i64;
    }

    /// Reset the remote (send) window to a new initial size
    pub fn init_remote_window(&mut self, size: u32) {
        self.initial_remote = size;
        self.remote_window = size as i64;
    }

    /// Set the consumption threshold at which `bytes_received` returns a
    /// credit-return increment. Defaults to the initial local window size.
    pub fn set_local_window_step(&mut self, step: u32) {
        self.local_step = step;
    }

    /// Current local (receive) window
    pub fn local_window(&self) -> i64 {
        self.local_window
    }

    /// Current remote (send) window
    pub fn remote_window(&self) -> i64 {
        self.remote_window
    }

    /// Initial remote window size
    pub fn initial_remote_window(&self) -> u32 {
        self.initial_remote
    }

    /// Debit the remote window after sending DATA
    pub fn bytes_sent(&mut self, n: usize) {
        self.remote_window -= n as i64;
    }

    /// Debit the local window after receiving DATA.
    ///
    /// Once cumulative consumption reaches one window step, returns the
    /// WINDOW_UPDATE increment that restores the local window to its initial
    /// advertised size; the caller is responsible for emitting the frame.
    pub fn bytes_received(&mut self, n: usize) -> Option<u32> {
        self.local_window -= n as i64;
        let consumed = self.initial_local as i64 - self.local_window;
        if self.local_step > 0 && consumed >= self.local_step as i64 && consumed > 0 {
            self.local_window += consumed;
            Some(consumed as u32)
        } else {
            None
        }
    }

    /// Credit the remote window from an inbound WINDOW_UPDATE
    pub fn update_remote_window(&mut self, increment: u32) -> Result<()> {
        let new_size = self.remote_window + increment as i64;
        if new_size > MAX_WINDOW_SIZE {
            return Err(Error::FlowControl(format!(
                "window size {} exceeds maximum (2^31-1)",
                new_size
            )));
        }
        self.remote_window = new_size;
        Ok(())
    }

    /// Credit the local window after an outbound WINDOW_UPDATE sent outside
    /// the step mechanism
    pub fn update_local_window(&mut self, increment: u32) {
        self.local_window += increment as i64;
    }

    /// Apply a changed INITIAL_WINDOW_SIZE setting to the remote window.
    ///
    /// The delta between old and new initial size is added to the current
    /// window, which may leave it negative (RFC 7540 Section 6.9.2).
    pub fn update_initial_remote_window(&mut self, new_initial: u32) -> Result<()> {
        let delta = new_initial as i64 - self.initial_remote as i64;
        let new_size = self.remote_window + delta;
        if new_size > MAX_WINDOW_SIZE {
            return Err(Error::FlowControl(format!(
                "window size {} exceeds maximum (2^31-1)",
                new_size
            )));
        }
        self.initial_remote = new_initial;
        self.remote_window = new_size;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DEFAULT_INITIAL_WINDOW_SIZE;

    #[test]
    fn test_initial_windows() {
        let fc = FlowController::new(DEFAULT_INITIAL_WINDOW_SIZE, DEFAULT_INITIAL_WINDOW_SIZE);
        assert_eq!(fc.local_window(), DEFAULT_INITIAL_WINDOW_SIZE as i64);
        assert_eq!(fc.remote_window(), DEFAULT_INITIAL_WINDOW_SIZE as i64);
    }

    #[test]
    fn test_bytes_sent_debits_remote() {
        let mut fc = FlowController::new(100, 100);
        fc.bytes_sent(60);
        assert_eq!(fc.remote_window(), 40);
        fc.bytes_sent(60);
        assert_eq!(fc.remote_window(), -20); // negative is legal transiently
    }

    #[test]
    fn test_credit_return_at_step() {
        let mut fc = FlowController::new(100, 100);
        fc.set_local_window_step(50);

        assert_eq!(fc.bytes_received(30), None);
        assert_eq!(fc.local_window(), 70);

        // Crosses the 50-byte step: increment restores the initial window
        let inc = fc.bytes_received(30).unwrap();
        assert_eq!(inc, 60);
        assert_eq!(fc.local_window(), 100);
    }

    #[test]
    fn test_default_step_is_initial_window() {
        let mut fc = FlowController::new(100, 100);
        assert_eq!(fc.bytes_received(99), None);
        let inc = fc.bytes_received(1).unwrap();
        assert_eq!(inc, 100);
        assert_eq!(fc.local_window(), 100);
    }

    #[test]
    fn test_update_remote_window() {
        let mut fc = FlowController::new(100, 100);
        fc.bytes_sent(80);
        fc.update_remote_window(50).unwrap();
        assert_eq!(fc.remote_window(), 70);
    }

    #[test]
    fn test_update_remote_window_overflow() {
        let mut fc = FlowController::new(100, 0x7FFF_FFFF);
        assert!(fc.update_remote_window(1).is_err());
    }

    #[test]
    fn test_initial_window_change_applies_delta() {
        let mut fc = FlowController::new(65535, 65535);
        fc.bytes_sent(10000);
        assert_eq!(fc.remote_window(), 55535);

        // Peer shrinks INITIAL_WINDOW_SIZE to 32768
        fc.update_initial_remote_window(32768).unwrap();
        assert_eq!(fc.remote_window(), 55535 + (32768 - 65535));

        // And grows it back
        fc.update_initial_remote_window(65535).unwrap();
        assert_eq!(fc.remote_window(), 55535);
    }

    #[test]
    fn test_initial_window_change_can_go_negative() {
        let mut fc = FlowController::new(65535, 65535);
        fc.bytes_sent(65000);
        fc.update_initial_remote_window(1000).unwrap();
        assert!(fc.remote_window() < 0);
    }
}
