//! Tensor helpers shared by the model components.

use candle_core::{Device, Tensor, D};

/// Epsilon used when normalizing vectors for cosine similarity.
pub const COSINE_EPS: f64 = 1e-8;

/// Normalize along the last dimension to unit L2 length.
///
/// # Formula
///
/// `normalized = x / max(||x||_2, eps)`
pub fn l2_normalize(x: &Tensor, eps: f64) -> candle_core::Result<Tensor> {
    let norm = x.sqr()?.sum_keepdim(D::Minus1)?.sqrt()?.maximum(eps)?;
    x.broadcast_div(&norm)
}

/// Max pooling over `(N, C, H, W)` with symmetric spatial padding.
///
/// Padding is filled with zeros, which matches `-inf` padding only for
/// non-negative inputs. Every call site pools a ReLU output.
///
/// Computed as the elementwise maximum of `kernel * kernel` strided views,
/// which keeps a backward pass when `kernel != stride`.
pub fn max_pool2d_padded(
    x: &Tensor,
    kernel: usize,
    stride: usize,
    padding: usize,
) -> candle_core::Result<Tensor> {
    let padded = if padding > 0 {
        x.pad_with_zeros(2, padding, padding)?
            .pad_with_zeros(3, padding, padding)?
    } else {
        x.clone()
    };
    let (_, _, h, w) = padded.dims4()?;
    if kernel == 0 || stride == 0 || h < kernel || w < kernel {
        candle_core::bail!(
            "max pool kernel {} stride {} does not fit a {}x{} input",
            kernel,
            stride,
            h,
            w
        );
    }
    let out_h = (h - kernel) / stride + 1;
    let out_w = (w - kernel) / stride + 1;
    let rows = strided_index(out_h, stride, x.device())?;
    let cols = strided_index(out_w, stride, x.device())?;

    let mut pooled: Option<Tensor> = None;
    for dy in 0..kernel {
        let band = padded
            .narrow(2, dy, (out_h - 1) * stride + 1)?
            .contiguous()?
            .index_select(&rows, 2)?;
        for dx in 0..kernel {
            let view = band
                .narrow(3, dx, (out_w - 1) * stride + 1)?
                .contiguous()?
                .index_select(&cols, 3)?;
            pooled = Some(match pooled {
                Some(acc) => acc.maximum(&view)?,
                None => view,
            });
        }
    }
    pooled.ok_or_else(|| candle_core::Error::Msg("empty max pool kernel".to_string()))
}

/// `[0, stride, 2 * stride, ..]` with `len` entries.
fn strided_index(len: usize, stride: usize, device: &Device) -> candle_core::Result<Tensor> {
    Tensor::arange_step(0u32, (len * stride) as u32, stride as u32, device)
}

/// Global average pooling `(N, C, H, W) -> (N, C)`.
pub fn global_avg_pool2d(x: &Tensor) -> candle_core::Result<Tensor> {
    x.mean(D::Minus1)?.mean(D::Minus1)
}
