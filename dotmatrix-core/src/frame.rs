//! Double-buffered indexed frame output.
//!
//! The PPU owns one in-progress buffer and flips an atomic index when a
//! frame completes; a display thread loads the index with acquire and
//! reads the other buffer. Pixels are relaxed `AtomicU8`s (2-bit color
//! indices), so cross-thread reads need no lock: the release store of the
//! index orders every pixel of the published frame before it.

use std::sync::atomic::{AtomicU8, Ordering};

use crate::{HEIGHT, WIDTH};

pub const FRAME_PIXEL_COUNT: usize = WIDTH as usize * HEIGHT as usize;

pub struct FrameBuffers {
    published_index: AtomicU8,
    buffers: [Box<[AtomicU8]>; 2],
}

impl FrameBuffers {
    pub(crate) fn new() -> Self {
        let buffer = || (0..FRAME_PIXEL_COUNT).map(|_| AtomicU8::new(0)).collect();
        Self {
            published_index: AtomicU8::new(0),
            buffers: [buffer(), buffer()],
        }
    }

    /// Which of the two buffers currently holds a complete frame.
    pub fn published_index(&self) -> u8 {
        self.published_index.load(Ordering::Acquire)
    }

    /// Copy the published frame out. 2-bit color indices, row-major,
    /// `WIDTH * HEIGHT` entries.
    pub fn copy_published_into(&self, destination: &mut [u8; FRAME_PIXEL_COUNT]) {
        let buffer = &self.buffers[usize::from(self.published_index())];
        for (destination, pixel) in destination.iter_mut().zip(buffer.iter()) {
            *destination = pixel.load(Ordering::Relaxed);
        }
    }

    fn in_progress(&self) -> &[AtomicU8] {
        &self.buffers[usize::from(1 - self.published_index.load(Ordering::Relaxed))]
    }

    pub(crate) fn write_in_progress_pixel(&self, offset: usize, color_index: u8) {
        self.in_progress()[offset].store(color_index, Ordering::Relaxed);
    }

    pub(crate) fn clear_in_progress(&self) {
        for pixel in self.in_progress() {
            pixel.store(0, Ordering::Relaxed);
        }
    }

    /// Swap the roles of the two buffers; the frame written so far
    /// becomes visible to readers.
    pub(crate) fn publish(&self) {
        let in_progress = 1 - self.published_index.load(Ordering::Relaxed);
        self.published_index.store(in_progress, Ordering::Release);
    }
}
