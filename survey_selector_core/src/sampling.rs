use std::collections::VecDeque;

use parking_lot::Mutex;
use rand::Rng;

/// Exclusive upper bound of a sampling draw: draws are uniform in `0..SAMPLE_RANGE`.
pub const SAMPLE_RANGE: u32 = 100;

/// One uniform draw per eligibility check.
pub trait Sampler {
    fn draw(&self) -> u32;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadRngSampler;

impl Sampler for ThreadRngSampler {
    #[inline]
    fn draw(&self) -> u32 {
        rand::thread_rng().gen_range(0..SAMPLE_RANGE)
    }
}

/// Always returns the same draw.
#[derive(Clone, Copy, Debug)]
pub struct FixedSampler(pub u32);

impl Sampler for FixedSampler {
    #[inline]
    fn draw(&self) -> u32 {
        self.0
    }
}

/// Replays a scripted sequence of draws; falls back to `fallback` once exhausted.
#[derive(Debug)]
pub struct SequenceSampler {
    draws: Mutex<VecDeque<u32>>,
    fallback: u32,
}

impl SequenceSampler {
    pub fn new<I: IntoIterator<Item = u32>>(draws: I, fallback: u32) -> Self {
        Self {
            draws: Mutex::new(draws.into_iter().collect()),
            fallback,
        }
    }
}

impl Sampler for SequenceSampler {
    fn draw(&self) -> u32 {
        self.draws.lock().pop_front().unwrap_or(self.fallback)
    }
}

impl<S: Sampler + ?Sized> Sampler for std::sync::Arc<S> {
    fn draw(&self) -> u32 {
        (**self).draw()
    }
}

/// Inclusive comparison: threshold 100 always passes, threshold 0 passes only on a draw of 0.
#[inline]
pub fn sampled_in(draw: u32, threshold: i64) -> bool {
    (draw as i64) <= threshold
}
