//! Small DSP building blocks shared by the effect nodes.

/// A circular delay line. Capacity is fixed at construction so reads and
/// writes never allocate on the audio thread.
pub struct DelayLine {
    buf: Vec<f32>,
    write: usize,
}

impl DelayLine {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0.0; capacity.max(1)],
            write: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Read the sample written `delay` samples ago.
    #[inline]
    pub fn read(&self, delay: usize) -> f32 {
        let delay = delay.min(self.buf.len() - 1);
        let idx = (self.write + self.buf.len() - delay) % self.buf.len();
        self.buf[idx]
    }

    /// Read with linear interpolation at a fractional delay.
    #[inline]
    pub fn read_frac(&self, delay: f32) -> f32 {
        let delay = delay.clamp(0.0, (self.buf.len() - 1) as f32);
        let whole = delay as usize;
        let frac = delay - whole as f32;
        let a = self.read(whole);
        let b = self.read(whole + 1);
        a + (b - a) * frac
    }

    #[inline]
    pub fn push(&mut self, sample: f32) {
        self.buf[self.write] = sample;
        self.write = (self.write + 1) % self.buf.len();
    }

    pub fn reset(&mut self) {
        self.buf.fill(0.0);
        self.write = 0;
    }
}

#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    10.0f32.powf(db / 20.0)
}

#[inline]
pub fn linear_to_db(x: f32) -> f32 {
    20.0 * x.max(1e-9).log10()
}
