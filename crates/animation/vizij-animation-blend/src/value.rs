//! Element kinds and the typed payloads carried by curves and snapshots.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use crate::interp::{self, Kernel};

/// Closed set of payload kinds a channel can carry.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ElementKind {
    Scalar,
    Vec2,
    Vec3,
    Vec4,
    /// Unit quaternion (x, y, z, w).
    Rotation,
    /// Fixed-size blittable bytes; never interpolated.
    Blob,
    /// Opaque shared object; stored in an object slot instead of the byte buffer.
    ObjectRef,
}

impl ElementKind {
    /// Kinds that support arithmetic interpolation and blending.
    #[inline]
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            ElementKind::Scalar
                | ElementKind::Vec2
                | ElementKind::Vec3
                | ElementKind::Vec4
                | ElementKind::Rotation
        )
    }

    #[inline]
    pub fn uses_object_slot(self) -> bool {
        matches!(self, ElementKind::ObjectRef)
    }

    /// Byte size for kinds whose size does not depend on the payload.
    pub fn fixed_size(self) -> Option<usize> {
        match self {
            ElementKind::Scalar => Some(4),
            ElementKind::Vec2 => Some(8),
            ElementKind::Vec3 => Some(12),
            ElementKind::Vec4 | ElementKind::Rotation => Some(16),
            ElementKind::ObjectRef => Some(0),
            ElementKind::Blob => None,
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Interpolation between neighbouring keyframes.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InterpolationMode {
    Constant,
    #[default]
    Linear,
    Cubic,
}

/// Quaternion (x, y, z, w).
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Quat(pub [f32; 4]);

impl Quat {
    pub const IDENTITY: Quat = Quat([0.0, 0.0, 0.0, 1.0]);

    #[inline]
    pub fn from_xyzw(x: f32, y: f32, z: f32, w: f32) -> Self {
        Quat([x, y, z, w])
    }
}

/// Immutable fixed-size byte payload.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Blob(Box<[u8]>);

impl Blob {
    pub fn new(bytes: impl Into<Box<[u8]>>) -> Self {
        Blob(bytes.into())
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Shared opaque object handle. Equality is identity.
#[derive(Clone)]
pub struct ObjectRef(Arc<dyn Any + Send + Sync>);

impl ObjectRef {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        ObjectRef(Arc::new(value))
    }

    pub fn from_arc(value: Arc<dyn Any + Send + Sync>) -> Self {
        ObjectRef(value)
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    #[inline]
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.0) as *const (),
            Arc::as_ptr(&other.0) as *const (),
        )
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef({:p})", Arc::as_ptr(&self.0) as *const ())
    }
}

/// Borrowed, typed view of one channel inside a snapshot.
#[derive(Clone, Debug, PartialEq)]
pub enum SampledValue<'a> {
    Scalar(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Rotation(Quat),
    Blob(&'a [u8]),
    Object(&'a ObjectRef),
}

impl SampledValue<'_> {
    #[inline]
    pub fn kind(&self) -> ElementKind {
        match self {
            SampledValue::Scalar(_) => ElementKind::Scalar,
            SampledValue::Vec2(_) => ElementKind::Vec2,
            SampledValue::Vec3(_) => ElementKind::Vec3,
            SampledValue::Vec4(_) => ElementKind::Vec4,
            SampledValue::Rotation(_) => ElementKind::Rotation,
            SampledValue::Blob(_) => ElementKind::Blob,
            SampledValue::Object(_) => ElementKind::ObjectRef,
        }
    }

    pub fn as_scalar(&self) -> Option<f32> {
        match self {
            SampledValue::Scalar(v) => Some(*v),
            _ => None,
        }
    }
}

/// A payload type that can be stored in a [`Curve`](crate::curve::Curve).
pub trait CurveElement: Clone + fmt::Debug + Send + Sync + 'static {
    const KIND: ElementKind;

    /// Bytes this value occupies in a snapshot buffer (0 for object references).
    fn byte_size(&self) -> usize;

    /// Kernel for the given mode, resolved once when a curve is built.
    fn kernel(mode: InterpolationMode) -> Kernel<Self>;
}

macro_rules! numeric_element {
    ($ty:ty, $kind:expr) => {
        impl CurveElement for $ty {
            const KIND: ElementKind = $kind;

            #[inline]
            fn byte_size(&self) -> usize {
                std::mem::size_of::<$ty>()
            }

            fn kernel(mode: InterpolationMode) -> Kernel<Self> {
                Kernel::Numeric(interp::numeric_kernel::<$ty>(mode))
            }
        }
    };
}

numeric_element!(f32, ElementKind::Scalar);
numeric_element!([f32; 2], ElementKind::Vec2);
numeric_element!([f32; 3], ElementKind::Vec3);
numeric_element!([f32; 4], ElementKind::Vec4);
numeric_element!(Quat, ElementKind::Rotation);

impl CurveElement for Blob {
    const KIND: ElementKind = ElementKind::Blob;

    #[inline]
    fn byte_size(&self) -> usize {
        self.len()
    }

    fn kernel(mode: InterpolationMode) -> Kernel<Self> {
        Kernel::Discrete(interp::discrete_kernel(mode))
    }
}

impl CurveElement for ObjectRef {
    const KIND: ElementKind = ElementKind::ObjectRef;

    #[inline]
    fn byte_size(&self) -> usize {
        0
    }

    fn kernel(mode: InterpolationMode) -> Kernel<Self> {
        Kernel::Discrete(interp::discrete_kernel(mode))
    }
}
