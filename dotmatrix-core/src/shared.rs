//! Control flags shared between the emulation worker and the host.
//!
//! The host writes, the worker reads once per frame boundary; nothing
//! here needs more than release/acquire pairs. Cancellation is
//! cooperative: the host raises `stop` and stops calling `step`.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

#[derive(Debug)]
pub struct SharedControls {
    paused: AtomicBool,
    fast_forward: AtomicBool,
    fast_forward_multiplier: AtomicU8,
    stop: AtomicBool,
}

impl Default for SharedControls {
    fn default() -> Self {
        Self {
            paused: AtomicBool::new(false),
            fast_forward: AtomicBool::new(false),
            fast_forward_multiplier: AtomicU8::new(2),
            stop: AtomicBool::new(false),
        }
    }
}

impl SharedControls {
    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Release);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn set_fast_forward(&self, enabled: bool) {
        self.fast_forward.store(enabled, Ordering::Release);
    }

    pub fn set_fast_forward_multiplier(&self, multiplier: u8) {
        self.fast_forward_multiplier.store(multiplier.max(1), Ordering::Release);
    }

    /// Effective speed factor for the next frame: 1 unless fast-forward
    /// is engaged.
    pub fn speed_multiplier(&self) -> u8 {
        if self.fast_forward.load(Ordering::Acquire) {
            self.fast_forward_multiplier.load(Ordering::Acquire)
        } else {
            1
        }
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::SharedControls;

    #[test]
    fn fast_forward_multiplier_applies_only_when_engaged() {
        let controls = SharedControls::default();
        controls.set_fast_forward_multiplier(4);
        assert_eq!(1, controls.speed_multiplier());
        controls.set_fast_forward(true);
        assert_eq!(4, controls.speed_multiplier());
    }

    #[test]
    fn multiplier_clamps_to_at_least_one() {
        let controls = SharedControls::default();
        controls.set_fast_forward_multiplier(0);
        controls.set_fast_forward(true);
        assert_eq!(1, controls.speed_multiplier());
    }

    #[test]
    fn stop_is_sticky() {
        let controls = SharedControls::default();
        assert!(!controls.stop_requested());
        controls.request_stop();
        assert!(controls.stop_requested());
    }
}
