// DSP helpers - Output hygiene for the real-time callback

/// Flush denormals to zero
///
/// Values this close to zero can stall some CPUs when they reach the
/// tail of an exponential decay. Threshold: 1e-15.
#[inline]
pub fn flush_denormals_to_zero(x: f32) -> f32 {
    if x.abs() < 1e-15 { 0.0 } else { x }
}

/// Soft clipping with tanh
///
/// Overlapping clicks at full volume can sum above 1.0; tanh keeps the
/// mix in [-1, 1] without a hard edge.
#[inline]
pub fn soft_clip(x: f32) -> f32 {
    x.tanh()
}
