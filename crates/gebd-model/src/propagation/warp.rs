//! Motion-compensation warp boundary.
//!
//! The warp resamples reference feature maps along a frame's motion field to
//! approximate that frame's features. Implementations are opaque to the
//! propagator and may run on an accelerator; [`BilinearMotionWarp`] is the
//! host reference implementation.

use std::collections::{BTreeMap, HashMap};

use candle_core::{DType, Tensor};

use crate::error::{BoundaryError, BoundaryResult};
use crate::types::{MotionVectorField, REFERENCE_LISTS};

/// Source maps of the frames one warp may read, keyed by frame index.
///
/// Every map is `(C, H, W)`. Frames missing from the set are treated like
/// out-of-range references.
#[derive(Debug, Clone)]
pub struct ReferenceMaps {
    zeros: Tensor,
    maps: BTreeMap<usize, Tensor>,
}

impl ReferenceMaps {
    /// Empty set for maps shaped like `zeros` (`(C, H, W)`).
    pub fn new(zeros: Tensor) -> BoundaryResult<Self> {
        zeros.dims3()?;
        Ok(Self {
            zeros,
            maps: BTreeMap::new(),
        })
    }

    /// Add the source map of `frame`.
    ///
    /// # Errors
    /// `ShapeMismatch` when `map` is not `(C, H, W)`.
    pub fn insert(&mut self, frame: usize, map: Tensor) -> BoundaryResult<()> {
        if map.dims() != self.zeros.dims() {
            return Err(BoundaryError::shape(
                "reference map",
                self.zeros.dims(),
                map.dims(),
            ));
        }
        self.maps.insert(frame, map);
        Ok(())
    }

    pub fn get(&self, frame: usize) -> Option<&Tensor> {
        self.maps.get(&frame)
    }

    /// Frames present, ascending.
    pub fn frames(&self) -> impl Iterator<Item = usize> + '_ {
        self.maps.keys().copied()
    }

    /// `(C, H, W)` of every map and of the warp output.
    pub fn map_dims(&self) -> BoundaryResult<(usize, usize, usize)> {
        Ok(self.zeros.dims3()?)
    }

    /// Zero map with the output shape, dtype and device.
    pub fn zeros(&self) -> &Tensor {
        &self.zeros
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}

/// Motion-compensated resampling of a frame's reference maps.
pub trait MotionWarp: Send + Sync {
    /// Warp `references` into frame `target` using `field`.
    ///
    /// Returns a `(C, H, W)` map. Must not mutate anything but its output.
    fn warp(
        &self,
        references: &ReferenceMaps,
        field: &MotionVectorField,
        target: usize,
    ) -> BoundaryResult<Tensor>;

    /// Short name for logs.
    fn name(&self) -> &str;
}

/// Host bilinear warp.
///
/// For every location and reference list whose reference frame is present in
/// the reference set and differs from the target, the reference map is
/// sampled bilinearly at `(x + dx, y + dy)` with zeros outside the map.
/// Samples from the two lists are averaged; locations with no usable
/// reference stay zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct BilinearMotionWarp;

impl BilinearMotionWarp {
    pub fn new() -> Self {
        Self
    }
}

impl MotionWarp for BilinearMotionWarp {
    fn warp(
        &self,
        references: &ReferenceMaps,
        field: &MotionVectorField,
        target: usize,
    ) -> BoundaryResult<Tensor> {
        let (channels, height, width) = references.map_dims()?;
        if (field.height(), field.width()) != (height, width) {
            return Err(BoundaryError::shape(
                "motion field vs feature map",
                (height, width),
                (field.height(), field.width()),
            ));
        }
        let zeros = references.zeros();
        if references.is_empty() {
            return Ok(zeros.clone());
        }

        let mut host: HashMap<usize, Vec<f32>> = HashMap::with_capacity(references.len());
        for frame in references.frames().filter(|&f| f != target) {
            if let Some(map) = references.get(frame) {
                host.insert(frame, map.to_dtype(DType::F32)?.flatten_all()?.to_vec1()?);
            }
        }

        let plane = height * width;
        let mut out = vec![0f32; channels * plane];
        let mut hits = vec![0u32; plane];

        for y in 0..height {
            for x in 0..width {
                let at = y * width + x;
                for list in 0..REFERENCE_LISTS {
                    let reference = field.reference(list, y, x);
                    if reference < 0 {
                        continue;
                    }
                    let Some(src) = host.get(&(reference as usize)) else {
                        continue;
                    };
                    let (dx, dy) = field.displacement(list, y, x);
                    sample_bilinear(
                        src,
                        channels,
                        height,
                        width,
                        x as f32 + dx,
                        y as f32 + dy,
                        &mut out,
                        at,
                    );
                    hits[at] += 1;
                }
            }
        }

        for (at, &count) in hits.iter().enumerate() {
            if count > 1 {
                let scale = 1.0 / count as f32;
                for c in 0..channels {
                    out[c * plane + at] *= scale;
                }
            }
        }

        Ok(Tensor::from_vec(out, (channels, height, width), zeros.device())?
            .to_dtype(zeros.dtype())?)
    }

    fn name(&self) -> &str {
        "bilinear"
    }
}

/// Accumulate a bilinear sample of every channel of `src` at `(sx, sy)` into
/// `out[c * H * W + at]`.
#[allow(clippy::too_many_arguments)]
fn sample_bilinear(
    src: &[f32],
    channels: usize,
    height: usize,
    width: usize,
    sx: f32,
    sy: f32,
    out: &mut [f32],
    at: usize,
) {
    let x0 = sx.floor();
    let y0 = sy.floor();
    let fx = sx - x0;
    let fy = sy - y0;
    let plane = height * width;

    let corners = [
        (y0, x0, (1.0 - fy) * (1.0 - fx)),
        (y0, x0 + 1.0, (1.0 - fy) * fx),
        (y0 + 1.0, x0, fy * (1.0 - fx)),
        (y0 + 1.0, x0 + 1.0, fy * fx),
    ];

    for (cy, cx, weight) in corners {
        if weight == 0.0 || cy < 0.0 || cx < 0.0 {
            continue;
        }
        let (cy, cx) = (cy as usize, cx as usize);
        if cy >= height || cx >= width {
            continue;
        }
        let offset = cy * width + cx;
        for c in 0..channels {
            out[c * plane + at] += weight * src[c * plane + offset];
        }
    }
}
