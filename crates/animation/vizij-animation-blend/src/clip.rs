//! Clips: named per-property curves with a duration and repeat policy.
//!
//! A clip is mutable while it is being assembled. Registering it with a blender
//! freezes it; every later mutation fails with [`BlendError::ClipFrozen`].

use std::sync::atomic::{AtomicBool, Ordering};

use hashbrown::HashMap;
use tracing::debug;

use crate::config::BlendConfig;
use crate::curve::{AnyCurve, Curve};
use crate::error::BlendError;
use crate::interp::Interpolate;
use crate::optimized::{AnyOptimizedData, OptimizedData};
use crate::time::{map_clip_time, ClipTime, CompressedTime, RepeatMode};
use crate::value::{ElementKind, Quat};

/// How a clip stores one property.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClipChannel {
    /// Index into the clip's curve list; `None` once the property lives in an
    /// optimized stream.
    pub curve_index: Option<usize>,
    pub kind: ElementKind,
    pub element_size: usize,
    pub is_user_custom_property: bool,
}

#[derive(Debug)]
pub struct Clip {
    name: String,
    duration: CompressedTime,
    repeat_mode: RepeatMode,
    properties: Vec<(String, ClipChannel)>,
    index: HashMap<String, usize>,
    curves: Vec<Option<AnyCurve>>,
    optimized: Vec<AnyOptimizedData>,
    page_size: usize,
    frozen: AtomicBool,
}

impl Clone for Clip {
    /// Clones are unfrozen so they can be edited independently.
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            duration: self.duration,
            repeat_mode: self.repeat_mode,
            properties: self.properties.clone(),
            index: self.index.clone(),
            curves: self.curves.clone(),
            optimized: self.optimized.clone(),
            page_size: self.page_size,
            frozen: AtomicBool::new(false),
        }
    }
}

impl Clip {
    pub fn new(name: impl Into<String>, duration: CompressedTime, repeat_mode: RepeatMode) -> Self {
        Self {
            name: name.into(),
            duration,
            repeat_mode,
            properties: Vec::new(),
            index: HashMap::new(),
            curves: Vec::new(),
            optimized: Vec::new(),
            page_size: BlendConfig::default().optimized_page_size,
            frozen: AtomicBool::new(false),
        }
    }

    /// Entries per page used by [`Clip::optimize`].
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn duration(&self) -> CompressedTime {
        self.duration
    }

    #[inline]
    pub fn repeat_mode(&self) -> RepeatMode {
        self.repeat_mode
    }

    /// Map elapsed playback time onto this clip's time range.
    pub fn local_time(&self, elapsed: CompressedTime) -> ClipTime {
        map_clip_time(elapsed, self.duration, self.repeat_mode)
    }

    /// Properties in insertion order.
    pub fn channels(&self) -> impl Iterator<Item = (&str, &ClipChannel)> + '_ {
        self.properties.iter().map(|(name, cc)| (name.as_str(), cc))
    }

    pub fn channel(&self, property: &str) -> Option<&ClipChannel> {
        self.index.get(property).map(|&i| &self.properties[i].1)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Direct-path curve for `property`, if it has not been optimized.
    pub fn curve(&self, property: &str) -> Option<&AnyCurve> {
        self.channel(property)
            .and_then(|cc| cc.curve_index)
            .and_then(|i| self.curve_at(i))
    }

    #[inline]
    pub(crate) fn curve_at(&self, index: usize) -> Option<&AnyCurve> {
        self.curves.get(index).and_then(Option::as_ref)
    }

    #[inline]
    pub fn optimized(&self) -> &[AnyOptimizedData] {
        &self.optimized
    }

    #[inline]
    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    pub(crate) fn freeze(&self) {
        self.frozen.store(true, Ordering::Release);
    }

    fn ensure_mutable(&self) -> Result<(), BlendError> {
        if self.is_frozen() {
            return Err(BlendError::ClipFrozen {
                clip: self.name.clone(),
            });
        }
        Ok(())
    }

    pub fn add_curve(
        &mut self,
        property: impl Into<String>,
        curve: impl Into<AnyCurve>,
    ) -> Result<(), BlendError> {
        self.insert_curve(property.into(), curve.into(), false)
    }

    /// Add a curve whose channel is consumed by the caller instead of the write plan.
    pub fn add_user_curve(
        &mut self,
        property: impl Into<String>,
        curve: impl Into<AnyCurve>,
    ) -> Result<(), BlendError> {
        self.insert_curve(property.into(), curve.into(), true)
    }

    fn insert_curve(
        &mut self,
        property: String,
        curve: AnyCurve,
        is_user_custom_property: bool,
    ) -> Result<(), BlendError> {
        self.ensure_mutable()?;
        let kind = curve.kind();
        let element_size = curve.element_size();
        let curve_index = match self.channel(&property).and_then(|cc| cc.curve_index) {
            Some(i) => {
                self.curves[i] = Some(curve);
                i
            }
            None => {
                self.curves.push(Some(curve));
                self.curves.len() - 1
            }
        };
        let channel = ClipChannel {
            curve_index: Some(curve_index),
            kind,
            element_size,
            is_user_custom_property,
        };
        match self.index.get(&property) {
            Some(&i) => self.properties[i].1 = channel,
            None => {
                self.index.insert(property.clone(), self.properties.len());
                self.properties.push((property, channel));
            }
        }
        Ok(())
    }

    /// [`Clip::optimize`] with the page size taken from `config`.
    pub fn optimize_with(&mut self, config: &BlendConfig) -> Result<(), BlendError> {
        self.ensure_mutable()?;
        self.page_size = config.optimized_page_size.max(1);
        self.optimize()
    }

    /// Move every numeric curve into one merged stream per element kind.
    ///
    /// Calling it again after adding curves folds the new curves in.
    pub fn optimize(&mut self) -> Result<(), BlendError> {
        self.ensure_mutable()?;
        self.restore_optimized_curves()?;

        let optimized: Vec<AnyOptimizedData> = [
            self.build_stream::<f32>(|c| match c {
                AnyCurve::Scalar(c) => Some(c),
                _ => None,
            }),
            self.build_stream::<[f32; 2]>(|c| match c {
                AnyCurve::Vec2(c) => Some(c),
                _ => None,
            }),
            self.build_stream::<[f32; 3]>(|c| match c {
                AnyCurve::Vec3(c) => Some(c),
                _ => None,
            }),
            self.build_stream::<[f32; 4]>(|c| match c {
                AnyCurve::Vec4(c) => Some(c),
                _ => None,
            }),
            self.build_stream::<Quat>(|c| match c {
                AnyCurve::Rotation(c) => Some(c),
                _ => None,
            }),
        ]
        .into_iter()
        .flatten()
        .collect();

        for (_, cc) in self.properties.iter_mut() {
            if cc.kind.is_numeric() {
                if let Some(i) = cc.curve_index.take() {
                    self.curves[i] = None;
                }
            }
        }
        self.compact_curves();
        debug!(
            clip = %self.name,
            streams = optimized.len(),
            direct_curves = self.curves.len(),
            "clip optimized"
        );
        self.optimized = optimized;
        Ok(())
    }

    fn build_stream<T>(
        &self,
        pick: impl Fn(&AnyCurve) -> Option<&Curve<T>>,
    ) -> Option<AnyOptimizedData>
    where
        T: Interpolate,
        OptimizedData<T>: Into<AnyOptimizedData>,
    {
        let curves: Vec<(&str, &Curve<T>)> = self
            .properties
            .iter()
            .filter(|(_, cc)| cc.kind == T::KIND)
            .filter_map(|(name, cc)| {
                let curve = cc.curve_index.and_then(|i| self.curve_at(i))?;
                Some((name.as_str(), pick(curve)?))
            })
            .collect();
        if curves.is_empty() {
            return None;
        }
        Some(OptimizedData::build(curves, self.page_size).into())
    }

    /// Turn channels that live in optimized streams back into direct curves.
    fn restore_optimized_curves(&mut self) -> Result<(), BlendError> {
        let streams = std::mem::take(&mut self.optimized);
        for stream in &streams {
            for (name, cc) in self.properties.iter_mut() {
                if cc.curve_index.is_some() || cc.kind != stream.kind() {
                    continue;
                }
                let Some(slot) = stream.channel_index(name) else {
                    continue;
                };
                let curve = stream.restore_curve(slot)?;
                self.curves.push(Some(curve));
                cc.curve_index = Some(self.curves.len() - 1);
            }
        }
        Ok(())
    }

    fn compact_curves(&mut self) {
        let mut remap = vec![None; self.curves.len()];
        let mut kept = Vec::with_capacity(self.curves.len());
        for (i, curve) in self.curves.drain(..).enumerate() {
            if let Some(curve) = curve {
                remap[i] = Some(kept.len());
                kept.push(Some(curve));
            }
        }
        self.curves = kept;
        for (_, cc) in self.properties.iter_mut() {
            cc.curve_index = cc.curve_index.and_then(|i| remap[i]);
        }
    }
}
