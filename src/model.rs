// 该文件是 Maogou （猫狗识别） 项目的一部分。
// src/model.rs - 模型
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

use serde::Serialize;

use crate::frame::TensorBuffer;

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 不透明的数值模型：输入归一化张量，输出每个标签的置信度
pub trait Engine {
  type Error: std::error::Error + Send + Sync + 'static;

  fn run(&self, tensor: &TensorBuffer) -> Result<Vec<f32>, Self::Error>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recognition {
  pub id: String,
  pub title: String,
  pub confidence: f32,
}

impl Recognition {
  pub fn new(id: impl Into<String>, title: impl Into<String>, confidence: f32) -> Self {
    Self {
      id: id.into(),
      title: title.into(),
      confidence,
    }
  }
}

impl std::fmt::Display for Recognition {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "Title = {}, Confidence = {}", self.title, self.confidence)
  }
}

mod classifier;
pub mod rank;
pub use self::classifier::{
  Classifier, ClassifierError, DEFAULT_INPUT_SIZE, DEFAULT_MAX_RESULTS, DEFAULT_THRESHOLD,
};

#[cfg(feature = "onnx")]
mod onnx;
#[cfg(feature = "onnx")]
pub use self::onnx::{ClassifierBuilder, OnnxEngine, OnnxEngineBuilder, OnnxError, TensorLayout};
