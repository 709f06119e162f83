use crate::error::{CaptureError, Result};

/// Scroll offsets visited by one capture session, in CSS pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrollPlan {
    offsets: Vec<u32>,
    step: u32,
}

impl ScrollPlan {
    /// Plans the offsets for a container of `total_height` showing `viewport_height` rows.
    ///
    /// The cursor starts at 0 and advances by `floor(viewport × ratio) − overlap`,
    /// clamped to the last offset `total − viewport`, which is always visited.
    /// An advance that would not move forward is raised to one pixel.
    pub fn new(total_height: u32, viewport_height: u32, ratio: f64, overlap: u32) -> Result<Self> {
        if viewport_height == 0 || total_height == 0 {
            return Err(CaptureError::EmptyContainer);
        }
        if !ratio.is_finite() || ratio <= 0.0 {
            return Err(CaptureError::InvalidOptions(format!(
                "step ratio must be positive, got {ratio}"
            )));
        }

        let advance = (f64::from(viewport_height) * ratio).floor() as i64 - i64::from(overlap);
        let step = advance.max(1) as u32;
        let last = total_height.saturating_sub(viewport_height);

        let mut offsets = Vec::with_capacity((last / step) as usize + 2);
        let mut cursor = 0u32;
        loop {
            offsets.push(cursor);
            if cursor == last {
                break;
            }
            cursor = cursor.saturating_add(step).min(last);
        }

        Ok(Self { offsets, step })
    }

    pub fn offsets(&self) -> &[u32] {
        &self.offsets
    }

    /// Pixels advanced between two non-final stops.
    pub fn step(&self) -> u32 {
        self.step
    }

    /// Number of scroll advances after the initial stop at 0.
    pub fn advances(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn last_offset(&self) -> u32 {
        self.offsets.last().copied().unwrap_or_default()
    }
}
