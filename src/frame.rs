// 该文件是 Maogou （猫狗识别） 项目的一部分。
// src/frame.rs - 输入帧与张量缓冲区定义
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use image::{DynamicImage, RgbaImage, imageops::FilterType};
use thiserror::Error;
use tracing::debug;

const RGB_CHANNELS: usize = 3;
const BYTES_PER_FLOAT: usize = std::mem::size_of::<f32>();

pub const IMAGE_MEAN: f32 = 0.0;
pub const IMAGE_STD: f32 = 255.0;

#[derive(Error, Debug, PartialEq)]
pub enum TensorError {
  #[error("图像尺寸为空: {0}x{1}")]
  EmptyImage(u32, u32),
  #[error("输入尺寸无效: {0}")]
  InvalidSide(u32),
  #[error("像素数量不匹配: 期望 {expected}, 实际 {actual}")]
  PixelCountMismatch { expected: usize, actual: usize },
}

/// 通道归一化参数，`(value - mean) / std`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalization {
  pub mean: f32,
  pub std: f32,
}

impl Default for Normalization {
  fn default() -> Self {
    Self {
      mean: IMAGE_MEAN,
      std: IMAGE_STD,
    }
  }
}

impl Normalization {
  #[inline]
  pub fn apply(&self, value: u8) -> f32 {
    (value as f32 - self.mean) / self.std
  }
}

/// 一帧待识别的图像，附带来源描述
#[derive(Debug, Clone)]
pub struct ImageFrame {
  pub source: String,
  pub image: DynamicImage,
}

impl ImageFrame {
  pub fn new(source: impl Into<String>, image: DynamicImage) -> Self {
    Self {
      source: source.into(),
      image,
    }
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }
}

/// 将 RGBA 像素打包为 32 位 ARGB 整数
#[inline]
pub fn pack_argb(pixel: [u8; 4]) -> u32 {
  let [r, g, b, a] = pixel;
  u32::from_be_bytes([a, r, g, b])
}

/// 归一化后的 NHWC 浮点张量（单张图像，RGB 交错，行优先）
#[derive(Debug, Clone)]
pub struct TensorBuffer {
  side: u32,
  data: Box<[f32]>,
}

impl TensorBuffer {
  /// 缩放（不保持宽高比，最近邻）到 side×side 后归一化
  pub fn from_image(
    image: &DynamicImage,
    side: u32,
    normalization: Normalization,
  ) -> Result<Self, TensorError> {
    if side == 0 {
      return Err(TensorError::InvalidSide(side));
    }

    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
      return Err(TensorError::EmptyImage(width, height));
    }

    // 先缩放再转换，避免复制原尺寸图像
    let scaled: RgbaImage = if (width, height) == (side, side) {
      image.to_rgba8()
    } else {
      debug!("缩放图像: {}x{} -> {}x{}", width, height, side, side);
      image.resize_exact(side, side, FilterType::Nearest).to_rgba8()
    };

    let pixels: Vec<u32> = scaled.pixels().map(|p| pack_argb(p.0)).collect();
    Self::from_argb_pixels(side, &pixels, normalization)
  }

  /// 由已打包的 ARGB 像素（行优先，恰好 side² 个）构造
  pub fn from_argb_pixels(
    side: u32,
    pixels: &[u32],
    normalization: Normalization,
  ) -> Result<Self, TensorError> {
    if side == 0 {
      return Err(TensorError::InvalidSide(side));
    }

    let expected = side as usize * side as usize;
    if pixels.len() != expected {
      return Err(TensorError::PixelCountMismatch {
        expected,
        actual: pixels.len(),
      });
    }

    let mut data = Vec::with_capacity(expected * RGB_CHANNELS);
    for &argb in pixels {
      data.push(normalization.apply(((argb >> 16) & 0xFF) as u8));
      data.push(normalization.apply(((argb >> 8) & 0xFF) as u8));
      data.push(normalization.apply((argb & 0xFF) as u8));
    }

    Ok(Self {
      side,
      data: data.into_boxed_slice(),
    })
  }

  pub fn side(&self) -> u32 {
    self.side
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  /// 浮点元素个数
  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  /// 字节长度，恒为 4 × side² × 3
  pub fn byte_len(&self) -> usize {
    self.data.len() * BYTES_PER_FLOAT
  }

  pub fn as_slice(&self) -> &[f32] {
    &self.data
  }

  /// 本机字节序的原始字节
  pub fn to_ne_bytes(&self) -> Vec<u8> {
    self.data.iter().flat_map(|v| v.to_ne_bytes()).collect()
  }

  /// 转换为 NCHW 排列
  pub fn to_nchw(&self) -> Vec<f32> {
    let plane = self.side as usize * self.side as usize;
    let mut out = vec![0.0f32; self.data.len()];
    for (idx, pixel) in self.data.chunks_exact(RGB_CHANNELS).enumerate() {
      for (c, &value) in pixel.iter().enumerate() {
        out[c * plane + idx] = value;
      }
    }
    out
  }
}
