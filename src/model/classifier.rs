// 该文件是 Maogou （猫狗识别） 项目的一部分。
// src/model/classifier.rs - 图像分类器
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

use image::DynamicImage;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
  frame::{ImageFrame, Normalization, TensorBuffer, TensorError},
  label::{LabelError, LabelTable},
  model::{Engine, Model, Recognition, rank::select_top},
};

pub const DEFAULT_INPUT_SIZE: u32 = 224;
pub const DEFAULT_THRESHOLD: f32 = 0.4;
pub const DEFAULT_MAX_RESULTS: usize = 3;

#[derive(Error, Debug)]
pub enum ClassifierError {
  #[error("输入尺寸无效: {0}")]
  InvalidInputSize(u32),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("模型参数无效: {0}")]
  InvalidQuery(String),
  #[cfg(feature = "onnx")]
  #[error("ONNX 模型错误: {0}")]
  Onnx(#[from] crate::model::OnnxError),
  #[error("标签错误: {0}")]
  Label(#[from] LabelError),
  #[error("预处理错误: {0}")]
  Tensor(#[from] TensorError),
  #[error("推理错误: {0}")]
  Engine(Box<dyn std::error::Error + Send + Sync>),
}

impl ClassifierError {
  pub fn engine<E: std::error::Error + Send + Sync + 'static>(err: E) -> Self {
    ClassifierError::Engine(Box::new(err))
  }
}

/// 推理助手：持有不可变的模型与标签表，调用之间无状态
pub struct Classifier<E> {
  engine: E,
  labels: LabelTable,
  input_size: u32,
  normalization: Normalization,
  threshold: f32,
  max_results: usize,
}

impl<E> std::fmt::Debug for Classifier<E> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Classifier")
      .field("labels", &self.labels.len())
      .field("input_size", &self.input_size)
      .field("threshold", &self.threshold)
      .field("max_results", &self.max_results)
      .finish_non_exhaustive()
  }
}

impl<E: Engine> Classifier<E> {
  pub fn new(engine: E, labels: LabelTable, input_size: u32) -> Result<Self, ClassifierError> {
    if input_size == 0 {
      return Err(ClassifierError::InvalidInputSize(input_size));
    }

    Ok(Self {
      engine,
      labels,
      input_size,
      normalization: Normalization::default(),
      threshold: DEFAULT_THRESHOLD,
      max_results: DEFAULT_MAX_RESULTS,
    })
  }

  pub fn with_threshold(mut self, threshold: f32) -> Self {
    self.threshold = threshold;
    self
  }

  pub fn with_max_results(mut self, max_results: usize) -> Self {
    self.max_results = max_results;
    self
  }

  pub fn with_normalization(mut self, normalization: Normalization) -> Self {
    self.normalization = normalization;
    self
  }

  pub fn labels(&self) -> &LabelTable {
    &self.labels
  }

  pub fn input_size(&self) -> u32 {
    self.input_size
  }

  pub fn threshold(&self) -> f32 {
    self.threshold
  }

  pub fn max_results(&self) -> usize {
    self.max_results
  }

  pub fn engine(&self) -> &E {
    &self.engine
  }

  pub fn preprocess(&self, image: &DynamicImage) -> Result<TensorBuffer, ClassifierError> {
    Ok(TensorBuffer::from_image(
      image,
      self.input_size,
      self.normalization,
    )?)
  }

  pub fn classify(&self, image: &DynamicImage) -> Result<Vec<Recognition>, ClassifierError> {
    let tensor = self.preprocess(image)?;
    debug!("张量字节长度: {}", tensor.byte_len());

    let confidences = self.engine.run(&tensor).map_err(ClassifierError::engine)?;
    if confidences.len() != self.labels.len() {
      warn!(
        "模型输出长度 {} 与标签数量 {} 不一致",
        confidences.len(),
        self.labels.len()
      );
    }

    let results = select_top(
      &confidences,
      &self.labels,
      self.threshold,
      self.max_results,
    );
    debug!("识别结果: {:?}", results);
    Ok(results)
  }
}

impl<E: Engine> Model for Classifier<E> {
  type Input = ImageFrame;
  type Output = Vec<Recognition>;
  type Error = ClassifierError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    self.classify(&input.image)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{Rgb, RgbImage};
  use std::{convert::Infallible, sync::Mutex};

  struct FixedEngine {
    scores: Vec<f32>,
    seen_bytes: Mutex<Option<usize>>,
  }

  impl FixedEngine {
    fn new(scores: &[f32]) -> Self {
      Self {
        scores: scores.to_vec(),
        seen_bytes: Mutex::new(None),
      }
    }
  }

  impl Engine for FixedEngine {
    type Error = Infallible;

    fn run(&self, tensor: &TensorBuffer) -> Result<Vec<f32>, Self::Error> {
      *self.seen_bytes.lock().unwrap() = Some(tensor.byte_len());
      Ok(self.scores.clone())
    }
  }

  #[derive(Debug, Error)]
  #[error("engine exploded")]
  struct Exploded;

  struct FailingEngine;

  impl Engine for FailingEngine {
    type Error = Exploded;

    fn run(&self, _tensor: &TensorBuffer) -> Result<Vec<f32>, Self::Error> {
      Err(Exploded)
    }
  }

  fn cats_dogs(scores: &[f32]) -> Classifier<FixedEngine> {
    let labels: LabelTable = ["cat", "dog"].into_iter().collect();
    Classifier::new(FixedEngine::new(scores), labels, 8).unwrap()
  }

  fn sample_image() -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(13, 7, Rgb([10, 200, 30])))
  }

  #[test]
  fn test_classify_cat() {
    let result = cats_dogs(&[0.9, 0.2]).classify(&sample_image()).unwrap();
    assert_eq!(result, vec![Recognition::new("0", "cat", 0.9)]);
  }

  #[test]
  fn test_classify_both_sorted() {
    let result = cats_dogs(&[0.5, 0.6]).classify(&sample_image()).unwrap();
    assert_eq!(
      result,
      vec![
        Recognition::new("1", "dog", 0.6),
        Recognition::new("0", "cat", 0.5)
      ]
    );
  }

  #[test]
  fn test_classify_none() {
    let result = cats_dogs(&[0.1, 0.2]).classify(&sample_image()).unwrap();
    assert!(result.is_empty());
  }

  #[test]
  fn test_longer_output_uses_unknown() {
    let result = cats_dogs(&[0.1, 0.2, 0.7]).classify(&sample_image()).unwrap();
    assert_eq!(result, vec![Recognition::new("2", "unknown", 0.7)]);
  }

  #[test]
  fn test_engine_sees_full_tensor() {
    let classifier = cats_dogs(&[0.9, 0.2]);
    classifier.classify(&sample_image()).unwrap();
    assert_eq!(*classifier.engine().seen_bytes.lock().unwrap(), Some(4 * 8 * 8 * 3));
  }

  #[test]
  fn test_zero_input_size_rejected() {
    let err = Classifier::new(FixedEngine::new(&[]), LabelTable::default(), 0).unwrap_err();
    assert!(matches!(err, ClassifierError::InvalidInputSize(0)));
  }

  #[test]
  fn test_empty_image_is_error() {
    let err = cats_dogs(&[0.9, 0.2])
      .classify(&DynamicImage::new_rgb8(0, 3))
      .unwrap_err();
    assert!(matches!(err, ClassifierError::Tensor(TensorError::EmptyImage(0, 3))));
  }

  #[test]
  fn test_engine_error_propagates() {
    let labels: LabelTable = ["cat"].into_iter().collect();
    let classifier = Classifier::new(FailingEngine, labels, 4).unwrap();
    let err = classifier.classify(&sample_image()).unwrap_err();
    assert!(matches!(err, ClassifierError::Engine(_)));
    assert_eq!(err.to_string(), "推理错误: engine exploded");
  }

  #[test]
  fn test_infer_uses_frame_image() {
    let frame = ImageFrame::new("memory", sample_image());
    let result = cats_dogs(&[0.2, 0.8]).infer(&frame).unwrap();
    assert_eq!(result[0].title, "dog");
  }

  #[test]
  fn test_custom_threshold() {
    let result = cats_dogs(&[0.3, 0.2])
      .with_threshold(0.1)
      .with_max_results(1)
      .classify(&sample_image())
      .unwrap();
    assert_eq!(result, vec![Recognition::new("0", "cat", 0.3)]);
  }
}
