//! Channel layout registry.
//!
//! Assigns every property seen across registered clips a stable home in a
//! snapshot: a byte offset (flag + value) for buffer kinds, or an object slot
//! index for object references. The layout only ever appends.

use std::sync::Arc;

use hashbrown::HashMap;
use tracing::debug;

use crate::buffer::FLAG_SIZE;
use crate::clip::Clip;
use crate::error::BlendError;
use crate::value::ElementKind;

/// One registered property.
#[derive(Clone, Debug, PartialEq)]
pub struct Channel {
    pub property: String,
    pub kind: ElementKind,
    /// Flag offset in the value buffer, or slot index for object references.
    pub offset: usize,
    /// Value size in bytes (0 for object references).
    pub size: usize,
    pub is_user_custom_property: bool,
}

impl Channel {
    #[inline]
    pub fn uses_object_slot(&self) -> bool {
        self.kind.uses_object_slot()
    }

    /// Offset of the value bytes that follow the flag.
    #[inline]
    pub fn value_offset(&self) -> usize {
        self.offset + FLAG_SIZE
    }
}

/// Shared snapshot of the registry's channels. A new list is published on growth;
/// holders of an older list keep seeing its prefix unchanged.
pub type ChannelList = Arc<Vec<Channel>>;

/// Buffer bytes and object slots needed to hold every channel in `channels`.
pub fn storage_extent(channels: &[Channel]) -> (usize, usize) {
    channels.iter().fold((0, 0), |(bytes, slots), c| {
        if c.uses_object_slot() {
            (bytes, slots.max(c.offset + 1))
        } else {
            (bytes.max(c.value_offset() + c.size), slots)
        }
    })
}

#[derive(Debug, Default)]
pub struct ChannelLayout {
    channels: ChannelList,
    index: HashMap<String, usize>,
    buffer_size: usize,
    object_slot_count: usize,
    version: u64,
}

impl ChannelLayout {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn channels(&self) -> &ChannelList {
        &self.channels
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Bytes a snapshot buffer needs to hold every channel.
    #[inline]
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    #[inline]
    pub fn object_slot_count(&self) -> usize {
        self.object_slot_count
    }

    /// Incremented every time the layout grows.
    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn index_of(&self, property: &str) -> Option<usize> {
        self.index.get(property).copied()
    }

    pub fn find(&self, property: &str) -> Option<&Channel> {
        self.index_of(property).map(|i| &self.channels[i])
    }

    /// Like [`find`](Self::find), but a missing property is an error.
    pub fn require(&self, property: &str) -> Result<&Channel, BlendError> {
        self.find(property).ok_or_else(|| BlendError::UnknownProperty {
            property: property.to_string(),
        })
    }

    /// Append channels for every property of `clip` not seen before.
    ///
    /// Conflicting kinds or blob sizes are rejected before anything is appended.
    /// Returns whether the layout grew.
    pub fn register_clip(&mut self, clip: &Clip) -> Result<bool, BlendError> {
        for (property, cc) in clip.channels() {
            if let Some(existing) = self.find(property) {
                if existing.kind != cc.kind {
                    return Err(BlendError::KindMismatch {
                        property: property.to_string(),
                        expected: existing.kind,
                        found: cc.kind,
                    });
                }
                if existing.size != cc.element_size {
                    return Err(BlendError::InvalidCurve {
                        reason: format!(
                            "property '{property}' is registered with {} bytes, clip '{}' has {}",
                            existing.size,
                            clip.name(),
                            cc.element_size
                        ),
                    });
                }
            }
        }

        let before = self.channels.len();
        for (property, cc) in clip.channels() {
            if self.index.contains_key(property) {
                continue;
            }
            let offset = if cc.kind.uses_object_slot() {
                let slot = self.object_slot_count;
                self.object_slot_count += 1;
                slot
            } else {
                let offset = self.buffer_size;
                self.buffer_size += FLAG_SIZE + cc.element_size;
                offset
            };
            debug!(
                property,
                kind = %cc.kind,
                offset,
                buffer_size = self.buffer_size,
                object_slots = self.object_slot_count,
                "layout: new channel"
            );
            let channels = Arc::make_mut(&mut self.channels);
            self.index.insert(property.to_string(), channels.len());
            channels.push(Channel {
                property: property.to_string(),
                kind: cc.kind,
                offset,
                size: cc.element_size,
                is_user_custom_property: cc.is_user_custom_property,
            });
        }

        let grew = self.channels.len() > before;
        if grew {
            self.version += 1;
        }
        Ok(grew)
    }
}
