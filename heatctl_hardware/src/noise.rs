/// Small deterministic PRNG for sensor noise; reproducible per seed.
#[derive(Debug, Clone)]
pub struct XorShift32(u32);

impl XorShift32 {
    pub fn new(seed: u32) -> Self {
        Self(seed.max(1))
    }

    pub fn next_u32(&mut self) -> u32 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.0 = x;
        x
    }

    /// Uniform sample in `[-amplitude, amplitude]`.
    pub fn symmetric(&mut self, amplitude: f64) -> f64 {
        if amplitude <= 0.0 {
            return 0.0;
        }
        let unit = f64::from(self.next_u32()) / f64::from(u32::MAX);
        (unit * 2.0 - 1.0) * amplitude
    }
}
