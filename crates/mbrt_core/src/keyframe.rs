//! Rigid instance keyframes.
//!
//! Every instance owns a contiguous range of [`FrameSrt`] keyframes inside
//! one flattened buffer, located by its [`TransformHeader`]. Headers are only
//! produced by the [`KeyframeBuffer`] push methods, which append the frames
//! and record the running offset in a single step, so a header can never
//! point at another instance's frames.

use bytemuck::{Pod, Zeroable};
use mbrt_math::{lerp3, Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::scene::{SceneError, SceneResult, Transform};

/// One keyframe: scale, rotation, translation at a normalized time.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct FrameSrt {
    pub rotation: Quat,
    pub translation: Vec3,
    pub time: f32,
    pub scale: Vec3,
    _pad: f32,
}

impl FrameSrt {
    pub fn new(translation: Vec3, rotation: Quat, scale: Vec3, time: f32) -> Self {
        Self {
            rotation,
            translation,
            time,
            scale,
            _pad: 0.0,
        }
    }

    /// Keyframe holding `transform` at `time`.
    pub fn from_transform(transform: &Transform, time: f32) -> Self {
        Self::new(transform.translation, transform.rotation, transform.scale, time)
    }

    pub fn identity() -> Self {
        Self::new(Vec3::ZERO, Quat::IDENTITY, Vec3::ONE, 0.0)
    }

    /// Object-to-world matrix, scale then rotate then translate.
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    /// Blend two keyframes: lerp translation and scale, slerp rotation.
    pub fn interpolate(a: &FrameSrt, b: &FrameSrt, t: f32) -> FrameSrt {
        FrameSrt::new(
            lerp3(a.translation, b.translation, t),
            a.rotation.slerp(b.rotation, t),
            lerp3(a.scale, b.scale, t),
            a.time + (b.time - a.time) * t,
        )
    }

    /// Transform of one instance at `time`.
    ///
    /// `frames` must be sorted by time. Times before the first or after the
    /// last keyframe clamp to that keyframe.
    pub fn sample(frames: &[FrameSrt], time: f32) -> FrameSrt {
        let (first, last) = match (frames.first(), frames.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return FrameSrt::identity(),
        };
        if frames.len() == 1 || time <= first.time {
            return *first;
        }
        if time >= last.time {
            return *last;
        }

        // First keyframe strictly after `time`; the one before it brackets from below
        let upper = frames.partition_point(|f| f.time <= time);
        let (a, b) = (&frames[upper - 1], &frames[upper]);
        let span = b.time - a.time;
        if span <= f32::EPSILON {
            return *b;
        }
        FrameSrt::interpolate(a, b, (time - a.time) / span)
    }
}

/// Location of one instance's keyframes in the flattened buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct TransformHeader {
    pub frame_index: u32,
    pub frame_count: u32,
}

impl TransformHeader {
    pub fn range(&self) -> std::ops::Range<usize> {
        let start = self.frame_index as usize;
        start..start + self.frame_count as usize
    }
}

/// Spatial path an instance follows across its keyframes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trajectory {
    /// Translation grows by `offset_per_step` at each keyframe.
    Linear { offset_per_step: Vec3 },
    /// Rotation about `axis` grows by `degrees_per_step` at each keyframe.
    Spin { axis: Vec3, degrees_per_step: f32 },
}

impl Default for Trajectory {
    fn default() -> Self {
        Trajectory::Linear {
            offset_per_step: Vec3::new(1.5, 1.5, 0.0),
        }
    }
}

impl Trajectory {
    fn apply(&self, start: &Transform, step: u32) -> Transform {
        let k = step as f32;
        match *self {
            Trajectory::Linear { offset_per_step } => Transform {
                translation: start.translation + offset_per_step * k,
                ..*start
            },
            Trajectory::Spin {
                axis,
                degrees_per_step,
            } => {
                let spin = Quat::from_axis_angle(axis.normalize_or_zero(), (degrees_per_step * k).to_radians());
                Transform {
                    rotation: (spin * start.rotation).normalize(),
                    ..*start
                }
            }
        }
    }
}

/// Keyframes for one instance.
///
/// One step yields the static transform at time 0. Otherwise keyframe `i`
/// sits at time `i / step_count` and carries `trajectory` advanced `i`
/// steps from `start`.
pub fn setup_transform(step_count: u32, start: &Transform, trajectory: &Trajectory) -> Vec<FrameSrt> {
    if step_count <= 1 {
        return vec![FrameSrt::from_transform(start, 0.0)];
    }

    (0..step_count)
        .map(|i| {
            let time = i as f32 / step_count as f32;
            FrameSrt::from_transform(&trajectory.apply(start, i), time)
        })
        .collect()
}

/// Flattened keyframes of every instance plus their headers, in instance order.
#[derive(Debug, Clone, Default)]
pub struct KeyframeBuffer {
    frames: Vec<FrameSrt>,
    headers: Vec<TransformHeader>,
}

impl KeyframeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the keyframes of the next instance and return its header.
    pub fn push_instance(
        &mut self,
        step_count: u32,
        start: &Transform,
        trajectory: &Trajectory,
    ) -> SceneResult<TransformHeader> {
        if step_count == 0 {
            return Err(SceneError::NoMotionSteps(self.headers.len()));
        }
        self.push_frames(setup_transform(step_count, start, trajectory))
    }

    /// Append an instance that never moves.
    pub fn push_static(&mut self, transform: &Transform) -> TransformHeader {
        let header = TransformHeader {
            frame_index: self.frames.len() as u32,
            frame_count: 1,
        };
        self.frames.push(FrameSrt::from_transform(transform, 0.0));
        self.headers.push(header);
        header
    }

    /// Append caller-built keyframes for the next instance.
    pub fn push_frames(&mut self, frames: Vec<FrameSrt>) -> SceneResult<TransformHeader> {
        validate_frames(self.headers.len(), &frames)?;
        let header = TransformHeader {
            frame_index: self.frames.len() as u32,
            frame_count: frames.len() as u32,
        };
        self.frames.extend(frames);
        self.headers.push(header);
        Ok(header)
    }

    pub fn frames(&self) -> &[FrameSrt] {
        &self.frames
    }

    pub fn headers(&self) -> &[TransformHeader] {
        &self.headers
    }

    pub fn instance_count(&self) -> usize {
        self.headers.len()
    }

    /// Keyframes of one instance.
    pub fn instance_frames(&self, instance: usize) -> Option<&[FrameSrt]> {
        self.headers
            .get(instance)
            .and_then(|h| self.frames.get(h.range()))
    }

    /// Raw frame buffer as uploaded to the engine.
    pub fn frame_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.frames)
    }

    pub fn into_parts(self) -> (Vec<FrameSrt>, Vec<TransformHeader>) {
        (self.frames, self.headers)
    }
}

/// Check that `headers` partition `frame_count` frames in order with no gaps.
pub fn validate_headers(headers: &[TransformHeader], frame_count: usize) -> SceneResult<()> {
    let mut expected = 0usize;
    for (instance, header) in headers.iter().enumerate() {
        if header.frame_index as usize != expected {
            return Err(SceneError::BadKeyframes(format!(
                "instance {} starts at frame {}, expected {}",
                instance, header.frame_index, expected
            )));
        }
        if header.frame_count == 0 {
            return Err(SceneError::NoMotionSteps(instance));
        }
        expected += header.frame_count as usize;
    }
    if expected != frame_count {
        return Err(SceneError::BadKeyframes(format!(
            "headers cover {} frames, buffer holds {}",
            expected, frame_count
        )));
    }
    Ok(())
}

fn validate_frames(instance: usize, frames: &[FrameSrt]) -> SceneResult<()> {
    let first = frames.first().ok_or(SceneError::NoMotionSteps(instance))?;
    if first.time != 0.0 {
        return Err(SceneError::BadKeyframes(format!(
            "instance {} first keyframe at time {}",
            instance, first.time
        )));
    }
    if let Some(pair) = frames.windows(2).find(|w| w[1].time < w[0].time) {
        return Err(SceneError::BadKeyframes(format!(
            "instance {} keyframe times go backwards ({} after {})",
            instance, pair[1].time, pair[0].time
        )));
    }
    if frames.iter().any(|f| !(0.0..1.0).contains(&f.time)) {
        return Err(SceneError::BadKeyframes(format!(
            "instance {} has a keyframe outside [0, 1)",
            instance
        )));
    }
    Ok(())
}
