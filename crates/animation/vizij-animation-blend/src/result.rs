//! Blend snapshots: a value buffer plus object slots laid out by a channel list.

use std::sync::Arc;

use crate::buffer::ValueBuffer;
use crate::layout::{Channel, ChannelLayout, ChannelList};
use crate::value::{ElementKind, ObjectRef, Quat, SampledValue};

/// Object-reference channel storage. `flag` mirrors the buffer existence flag.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObjectSlot {
    pub flag: f32,
    pub value: Option<ObjectRef>,
}

/// One sampled (or blended) snapshot of every registered channel.
///
/// Storage only ever grows; pooled results keep their allocations.
#[derive(Clone, Debug, Default)]
pub struct BlendResult {
    buffer: ValueBuffer,
    objects: Vec<ObjectSlot>,
    channels: Option<ChannelList>,
}

impl BlendResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grow storage to fit `layout` and capture its channel list.
    pub fn ensure_layout(&mut self, layout: &ChannelLayout) {
        self.ensure_storage(layout.buffer_size(), layout.object_slot_count());
        let current = layout.channels();
        if !self.channels.as_ref().is_some_and(|c| Arc::ptr_eq(c, current)) {
            self.channels = Some(current.clone());
        }
    }

    /// Grow storage to at least `buffer_size` bytes and `object_slots` slots.
    pub fn ensure_storage(&mut self, buffer_size: usize, object_slots: usize) {
        self.buffer.grow_to(buffer_size);
        if self.objects.len() < object_slots {
            self.objects.resize_with(object_slots, ObjectSlot::default);
        }
    }

    /// Capture `channels` unless a channel list is already attached.
    pub(crate) fn attach_channels(&mut self, channels: &ChannelList) {
        if self.channels.is_none() {
            self.channels = Some(channels.clone());
        }
    }

    /// Drop the captured channel list; storage is kept.
    pub fn clear_channels(&mut self) {
        self.channels = None;
    }

    #[inline]
    pub fn channels(&self) -> Option<&ChannelList> {
        self.channels.as_ref()
    }

    #[inline]
    pub fn buffer(&self) -> &ValueBuffer {
        &self.buffer
    }

    #[inline]
    pub fn buffer_mut(&mut self) -> &mut ValueBuffer {
        &mut self.buffer
    }

    #[inline]
    pub fn objects(&self) -> &[ObjectSlot] {
        &self.objects
    }

    #[inline]
    pub fn objects_mut(&mut self) -> &mut [ObjectSlot] {
        &mut self.objects
    }

    /// Existence flag of `channel`; 0 when storage predates the channel.
    pub fn flag(&self, channel: &Channel) -> f32 {
        if channel.uses_object_slot() {
            self.objects.get(channel.offset).map_or(0.0, |s| s.flag)
        } else {
            self.buffer.flag(channel.offset)
        }
    }

    pub fn set_flag(&mut self, channel: &Channel, flag: f32) {
        if channel.uses_object_slot() {
            if let Some(slot) = self.objects.get_mut(channel.offset) {
                slot.flag = flag;
            }
        } else {
            self.buffer.set_flag(channel.offset, flag);
        }
    }

    /// Typed value of `channel`, or `None` if the channel is absent in this snapshot.
    pub fn value(&self, channel: &Channel) -> Option<SampledValue<'_>> {
        if self.flag(channel) <= 0.0 {
            return None;
        }
        read_sampled(&self.buffer, &self.objects, channel)
    }

    /// Look up a channel by property name in the captured list and read it.
    pub fn value_by_name(&self, property: &str) -> Option<SampledValue<'_>> {
        let channel = self
            .channels
            .as_ref()?
            .iter()
            .find(|c| c.property == property)?;
        self.value(channel)
    }

    /// Copy `channel`'s flag and value from `other`.
    pub(crate) fn copy_channel_from(&mut self, other: &BlendResult, channel: &Channel) {
        if channel.uses_object_slot() {
            if let (Some(dst), Some(src)) = (
                self.objects.get_mut(channel.offset),
                other.objects.get(channel.offset),
            ) {
                dst.clone_from(src);
            }
        } else {
            let len = crate::buffer::FLAG_SIZE + channel.size;
            let src = other.buffer.read_bytes(channel.offset, len);
            self.buffer.write_bytes(channel.offset, src);
        }
    }
}

/// Decode a channel's value regardless of its flag.
pub(crate) fn read_sampled<'a>(
    buffer: &'a ValueBuffer,
    objects: &'a [ObjectSlot],
    channel: &Channel,
) -> Option<SampledValue<'a>> {
    let at = channel.value_offset();
    if !channel.uses_object_slot() && at + channel.size > buffer.len() {
        return None;
    }
    Some(match channel.kind {
        ElementKind::Scalar => SampledValue::Scalar(buffer.read_at::<f32>(at)),
        ElementKind::Vec2 => SampledValue::Vec2(buffer.read_at::<[f32; 2]>(at)),
        ElementKind::Vec3 => SampledValue::Vec3(buffer.read_at::<[f32; 3]>(at)),
        ElementKind::Vec4 => SampledValue::Vec4(buffer.read_at::<[f32; 4]>(at)),
        ElementKind::Rotation => SampledValue::Rotation(buffer.read_at::<Quat>(at)),
        ElementKind::Blob => SampledValue::Blob(buffer.read_bytes(at, channel.size)),
        ElementKind::ObjectRef => {
            SampledValue::Object(objects.get(channel.offset)?.value.as_ref()?)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::Clip;
    use crate::curve::Curve;
    use crate::time::CompressedTime;
    use crate::value::InterpolationMode;

    fn layout_with(props: &[&str]) -> ChannelLayout {
        let mut clip = Clip::new("c", CompressedTime(10), Default::default());
        for p in props {
            clip.add_curve(*p, Curve::from_keys(InterpolationMode::Linear, [(0, 1.0f32)]).unwrap())
                .unwrap();
        }
        let mut layout = ChannelLayout::new();
        layout.register_clip(&clip).unwrap();
        layout
    }

    #[test]
    fn ensure_layout_grows_and_keeps_values() {
        let layout = layout_with(&["a"]);
        let mut result = BlendResult::new();
        result.ensure_layout(&layout);
        let a = layout.find("a").unwrap().clone();
        result.buffer_mut().store_numeric(
            a.offset,
            2.0f32,
            crate::buffer::StoreMode::Overwrite,
        );

        let bigger = layout_with(&["a", "b"]);
        result.ensure_layout(&bigger);
        assert_eq!(result.buffer().len(), bigger.buffer_size());
        assert_eq!(result.value(&a), Some(SampledValue::Scalar(2.0)));
        assert_eq!(result.value_by_name("b"), None);
    }

    #[test]
    fn flag_of_unknown_storage_is_zero() {
        let layout = layout_with(&["a", "b"]);
        let result = BlendResult::new();
        assert_eq!(result.flag(layout.find("b").unwrap()), 0.0);
        assert!(result.channels().is_none());
    }
}
