//! Tempo to frame duration planning.

use crate::error::{MediaError, MediaResult};

/// Compute per-frame delays (centiseconds) so one loop spans `beats_per_loop` beats at
/// `tempo` beats per minute.
///
/// The total loop length is rounded half-up to whole centiseconds and split evenly.
/// The `remainder` leftover units go to frames `(i * frame_count / remainder) % frame_count`
/// for `i in 0..remainder`; existing gifs depend on that exact placement.
pub fn plan_frame_durations(
    tempo: f64,
    beats_per_loop: f64,
    frame_count: u32,
) -> MediaResult<Vec<u32>> {
    if frame_count == 0 {
        return Err(MediaError::invalid_argument("frame count must be positive"));
    }
    if !(tempo.is_finite() && tempo > 0.0) {
        return Err(MediaError::invalid_argument(format!(
            "tempo must be a positive number, got {}",
            tempo
        )));
    }
    if !(beats_per_loop.is_finite() && beats_per_loop > 0.0) {
        return Err(MediaError::invalid_argument(format!(
            "beats per loop must be a positive number, got {}",
            beats_per_loop
        )));
    }

    let beats_per_second = tempo / 60.0;
    let seconds_per_beat = 1.0 / beats_per_second;
    // f64::round is half away from zero, i.e. half-up for positive values.
    let total = (seconds_per_beat * beats_per_loop * 100.0).round();
    if !total.is_finite() || total > u32::MAX as f64 {
        return Err(MediaError::invalid_argument(format!(
            "loop duration of {} centiseconds is out of range",
            total
        )));
    }
    let total = total as u64;

    let frames = u64::from(frame_count);
    let base = (total / frames) as u32;
    let remainder = total % frames;

    let mut durations = vec![base; frame_count as usize];
    for i in 0..remainder {
        durations[((i * frames / remainder) % frames) as usize] += 1;
    }

    Ok(durations)
}
