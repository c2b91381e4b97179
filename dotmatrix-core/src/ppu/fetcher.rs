//! Tile-slice fetcher state.
//!
//! Mode 3 runs two of these micro-pipelines; each step of a fetch takes
//! two dots (tracked by the first-dot flip-flop) except the background
//! push, which waits for its FIFO to drain. Only one fetcher runs per
//! dot: a sprite hit steals the slot until its row has merged.

use crate::ppu::fifo::{BackgroundPixel, FIFO_CAPACITY};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetcherStep {
    #[default]
    GetTileId,
    GetTileRowLow,
    GetTileRowHigh,
    PushPixels,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetcherMode {
    #[default]
    Background,
    Window,
}

#[derive(Debug, Clone)]
pub struct ObjectSliceFetcher {
    pub step: FetcherStep,
    pub tile_index: u8,
    pub tile_row_low: u8,
    pub tile_row_high: u8,
    pub in_first_dot_of_step: bool,
    pub enabled: bool,
}

impl Default for ObjectSliceFetcher {
    fn default() -> Self {
        Self {
            step: FetcherStep::GetTileId,
            tile_index: 0,
            tile_row_low: 0,
            tile_row_high: 0,
            in_first_dot_of_step: true,
            enabled: false,
        }
    }
}

impl ObjectSliceFetcher {
    pub fn reset_state(&mut self) {
        *self = Self::default();
    }

    /// Two-dot pacing: returns true on the dot that completes the step.
    pub fn advance_half_step(&mut self) -> bool {
        let completing = !self.in_first_dot_of_step;
        self.in_first_dot_of_step = !self.in_first_dot_of_step;
        completing
    }
}

#[derive(Debug, Clone)]
pub struct BackgroundSliceFetcher {
    pub step: FetcherStep,
    pub tile_index: u8,
    pub tile_row_low: u8,
    pub tile_row_high: u8,
    pub in_first_dot_of_step: bool,
    pub enabled: bool,
    pub tile_row: [BackgroundPixel; FIFO_CAPACITY],
    pub mode: FetcherMode,
    pub fetcher_x: u8,
}

impl Default for BackgroundSliceFetcher {
    fn default() -> Self {
        Self {
            step: FetcherStep::GetTileId,
            tile_index: 0,
            tile_row_low: 0,
            tile_row_high: 0,
            in_first_dot_of_step: true,
            enabled: true,
            tile_row: Default::default(),
            mode: FetcherMode::Background,
            fetcher_x: 0,
        }
    }
}

impl BackgroundSliceFetcher {
    pub fn reset_state(&mut self) {
        *self = Self::default();
    }

    pub fn advance_half_step(&mut self) -> bool {
        let completing = !self.in_first_dot_of_step;
        self.in_first_dot_of_step = !self.in_first_dot_of_step;
        completing
    }
}

/// Decode one pixel of a tile row; bit 7 of each data byte is the
/// leftmost pixel.
pub fn pixel_color_index(tile_row_low: u8, tile_row_high: u8, bit_position: u8) -> u8 {
    let low_bit = (tile_row_low >> bit_position) & 1;
    let high_bit = (tile_row_high >> bit_position) & 1;
    (high_bit << 1) | low_bit
}
