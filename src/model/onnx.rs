// 该文件是 Maogou （猫狗识别） 项目的一部分。
// src/model/onnx.rs - ONNX Runtime 推理后端
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

use std::{
  fs::File,
  path::{Path, PathBuf},
  str::FromStr,
  sync::Mutex,
};

use memmap2::Mmap;
use ndarray::{Array4, ArrayViewD};
#[cfg(feature = "cuda")]
use ort::execution_providers::CUDAExecutionProvider;
use ort::{
  execution_providers::CPUExecutionProvider,
  session::{Session, builder::GraphOptimizationLevel},
  value::Value,
};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::TensorBuffer,
  label::LabelTable,
  model::{
    Classifier, ClassifierError, DEFAULT_INPUT_SIZE, DEFAULT_MAX_RESULTS, DEFAULT_THRESHOLD,
    Engine,
  },
};

const DEFAULT_THREADS: usize = 5;
const DEFAULT_LABEL_FILE: &str = "label.txt";

#[derive(Error, Debug)]
pub enum OnnxError {
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("模型无效: {0}")]
  ModelInvalid(String),
  #[error("ONNX Runtime 错误: {0}")]
  OrtError(String),
  #[error("张量形状错误: {0}")]
  ShapeError(#[from] ndarray::ShapeError),
  #[error("推理会话锁已损坏")]
  SessionPoisoned,
}

fn ort_error<E: std::fmt::Display>(err: E) -> OnnxError {
  OnnxError::OrtError(err.to_string())
}

/// 输入张量排列方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TensorLayout {
  /// `[1, side, side, 3]`
  #[default]
  Nhwc,
  /// `[1, 3, side, side]`
  Nchw,
}

impl FromStr for TensorLayout {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "nhwc" => Ok(TensorLayout::Nhwc),
      "nchw" => Ok(TensorLayout::Nchw),
      other => Err(format!("未知的张量排列: {}", other)),
    }
  }
}

pub struct OnnxEngine {
  session: Mutex<Session>,
  input_name: String,
  layout: TensorLayout,
  // 映射在引擎生命周期内保持
  _model: Mmap,
}

impl std::fmt::Debug for OnnxEngine {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("OnnxEngine")
      .field("input_name", &self.input_name)
      .field("layout", &self.layout)
      .field("model_bytes", &self._model.len())
      .finish_non_exhaustive()
  }
}

#[derive(Debug, Clone)]
pub struct OnnxEngineBuilder {
  model_path: PathBuf,
  threads: usize,
  acceleration: bool,
  layout: TensorLayout,
}

impl OnnxEngineBuilder {
  pub fn new<P: AsRef<Path>>(model_path: P) -> Self {
    Self {
      model_path: model_path.as_ref().to_path_buf(),
      threads: DEFAULT_THREADS,
      acceleration: true,
      layout: TensorLayout::default(),
    }
  }

  pub fn threads(mut self, threads: usize) -> Self {
    self.threads = threads;
    self
  }

  pub fn acceleration(mut self, acceleration: bool) -> Self {
    self.acceleration = acceleration;
    self
  }

  pub fn layout(mut self, layout: TensorLayout) -> Self {
    self.layout = layout;
    self
  }

  pub fn model_path(&self) -> &Path {
    &self.model_path
  }

  pub fn build(self) -> Result<OnnxEngine, OnnxError> {
    info!("加载模型文件: {}", self.model_path.display());
    let file = File::open(&self.model_path)?;
    // SAFETY: 映射为只读，模型文件在运行期间不应被改写
    let model = unsafe { Mmap::map(&file)? };
    debug!(
      "模型文件大小: {:.2} MB",
      model.len() as f64 / (1024.0 * 1024.0)
    );

    let mut providers = Vec::new();
    #[cfg(feature = "cuda")]
    {
      if self.acceleration {
        info!("启用 CUDA 加速");
        providers.push(CUDAExecutionProvider::default().build());
      }
    }
    #[cfg(not(feature = "cuda"))]
    {
      if self.acceleration {
        warn!("未启用 cuda 特性，使用 CPU 推理");
      }
    }
    providers.push(CPUExecutionProvider::default().build());

    info!("创建 ONNX Runtime 推理会话，线程数: {}", self.threads);
    let session = Session::builder()
      .map_err(ort_error)?
      .with_execution_providers(providers)
      .map_err(ort_error)?
      .with_optimization_level(GraphOptimizationLevel::Level3)
      .map_err(ort_error)?
      .with_intra_threads(self.threads)
      .map_err(ort_error)?
      .commit_from_memory(&model)
      .map_err(ort_error)?;

    let input_name = session
      .inputs
      .first()
      .map(|input| input.name.clone())
      .ok_or_else(|| OnnxError::ModelInvalid("模型没有输入".to_string()))?;
    if session.outputs.is_empty() {
      return Err(OnnxError::ModelInvalid("模型没有输出".to_string()));
    }
    debug!("模型输入: {}, 排列: {:?}", input_name, self.layout);
    info!("模型加载完成");

    Ok(OnnxEngine {
      session: Mutex::new(session),
      input_name,
      layout: self.layout,
      _model: model,
    })
  }
}

impl Engine for OnnxEngine {
  type Error = OnnxError;

  fn run(&self, tensor: &TensorBuffer) -> Result<Vec<f32>, Self::Error> {
    let input = input_array(tensor, self.layout)?;
    let input_value = Value::from_array(input).map_err(ort_error)?;

    let mut session = self.session.lock().map_err(|_| OnnxError::SessionPoisoned)?;
    debug!("执行模型推理");
    let outputs = session
      .run(ort::inputs![&self.input_name => input_value])
      .map_err(ort_error)?;

    let output = outputs[0].try_extract_array::<f32>().map_err(ort_error)?;
    debug!("模型输出形状: {:?}", output.shape());
    Ok(flatten_output(output.view()))
  }
}

/// 按排列方式构造单批次输入数组
fn input_array(tensor: &TensorBuffer, layout: TensorLayout) -> Result<Array4<f32>, OnnxError> {
  let side = tensor.side() as usize;
  let channels = tensor.channels();
  let input = match layout {
    TensorLayout::Nhwc => {
      Array4::from_shape_vec((1, side, side, channels), tensor.as_slice().to_vec())?
    }
    TensorLayout::Nchw => Array4::from_shape_vec((1, channels, side, side), tensor.to_nchw())?,
  };
  Ok(input)
}

/// `[1, N]` 或 `[N]` 的输出按逻辑顺序展平为置信度向量
fn flatten_output(output: ArrayViewD<'_, f32>) -> Vec<f32> {
  output.iter().copied().collect()
}

/// 从模型与标签文件构造 [`Classifier`]
#[derive(Debug, Clone)]
pub struct ClassifierBuilder {
  engine: OnnxEngineBuilder,
  labels_path: PathBuf,
  input_size: u32,
  threshold: f32,
  max_results: usize,
}

impl FromUrlWithScheme for ClassifierBuilder {
  const SCHEME: &'static str = "onnx";
}

fn parse_query<T: FromStr>(key: &str, value: &str) -> Result<T, ClassifierError> {
  value
    .parse()
    .map_err(|_| ClassifierError::InvalidQuery(format!("参数 {} 的值无效: {}", key, value)))
}

impl FromUrl for ClassifierBuilder {
  type Error = ClassifierError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ClassifierError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let model_path = PathBuf::from(url.path());
    let labels_path = model_path.with_file_name(DEFAULT_LABEL_FILE);
    let mut builder = ClassifierBuilder::new(model_path, labels_path);

    for (key, value) in url.query_pairs() {
      match &*key {
        "labels" => builder.labels_path = PathBuf::from(value.into_owned()),
        "size" => builder.input_size = parse_query(&key, &value)?,
        "threads" => {
          let threads = parse_query(&key, &value)?;
          builder = builder.threads(threads);
        }
        "accel" => {
          let acceleration = parse_query(&key, &value)?;
          builder = builder.acceleration(acceleration);
        }
        "layout" => {
          let layout = value.parse().map_err(ClassifierError::InvalidQuery)?;
          builder = builder.layout(layout);
        }
        "threshold" => builder.threshold = parse_query(&key, &value)?,
        "max_results" => builder.max_results = parse_query(&key, &value)?,
        other => warn!("忽略未知参数: {}", other),
      }
    }

    Ok(builder)
  }
}

impl ClassifierBuilder {
  pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(model_path: P, labels_path: Q) -> Self {
    Self {
      engine: OnnxEngineBuilder::new(model_path),
      labels_path: labels_path.as_ref().to_path_buf(),
      input_size: DEFAULT_INPUT_SIZE,
      threshold: DEFAULT_THRESHOLD,
      max_results: DEFAULT_MAX_RESULTS,
    }
  }

  pub fn input_size(mut self, input_size: u32) -> Self {
    self.input_size = input_size;
    self
  }

  pub fn threads(mut self, threads: usize) -> Self {
    self.engine = self.engine.threads(threads);
    self
  }

  pub fn acceleration(mut self, acceleration: bool) -> Self {
    self.engine = self.engine.acceleration(acceleration);
    self
  }

  pub fn layout(mut self, layout: TensorLayout) -> Self {
    self.engine = self.engine.layout(layout);
    self
  }

  pub fn threshold(mut self, threshold: f32) -> Self {
    self.threshold = threshold;
    self
  }

  pub fn max_results(mut self, max_results: usize) -> Self {
    self.max_results = max_results;
    self
  }

  pub fn build(self) -> Result<Classifier<OnnxEngine>, ClassifierError> {
    if self.input_size == 0 {
      return Err(ClassifierError::InvalidInputSize(self.input_size));
    }

    let labels = LabelTable::load(&self.labels_path)?;
    let engine = self.engine.build()?;
    info!(
      "分类器就绪: {} 个标签, 输入尺寸 {}x{}",
      labels.len(),
      self.input_size,
      self.input_size
    );

    Ok(
      Classifier::new(engine, labels, self.input_size)?
        .with_threshold(self.threshold)
        .with_max_results(self.max_results),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn test_url_defaults() {
    let url = Url::parse("onnx:///opt/models/cats_dogs.onnx").unwrap();
    let builder = ClassifierBuilder::from_url(&url).unwrap();
    assert_eq!(builder.engine.model_path(), Path::new("/opt/models/cats_dogs.onnx"));
    assert_eq!(builder.labels_path, PathBuf::from("/opt/models/label.txt"));
    assert_eq!(builder.input_size, DEFAULT_INPUT_SIZE);
    assert_eq!(builder.engine.threads, DEFAULT_THREADS);
    assert!(builder.engine.acceleration);
    assert_eq!(builder.engine.layout, TensorLayout::Nhwc);
  }

  #[test]
  fn test_url_query() {
    let url = Url::parse(
      "onnx:///m.onnx?labels=/tmp/l.txt&size=128&threads=2&accel=false&layout=NCHW&threshold=0.6&max_results=5",
    )
    .unwrap();
    let builder = ClassifierBuilder::from_url(&url).unwrap();
    assert_eq!(builder.labels_path, PathBuf::from("/tmp/l.txt"));
    assert_eq!(builder.input_size, 128);
    assert_eq!(builder.engine.threads, 2);
    assert!(!builder.engine.acceleration);
    assert_eq!(builder.engine.layout, TensorLayout::Nchw);
    assert_eq!(builder.threshold, 0.6);
    assert_eq!(builder.max_results, 5);
  }

  #[test]
  fn test_url_scheme_mismatch() {
    let url = Url::parse("yolo:///m.onnx").unwrap();
    assert!(matches!(
      ClassifierBuilder::from_url(&url),
      Err(ClassifierError::ModelPathError(_))
    ));
  }

  #[test]
  fn test_url_bad_value() {
    for query in ["size=big", "threads=x", "accel=maybe", "layout=chw", "threshold=high"] {
      let url = Url::parse(&format!("onnx:///m.onnx?{}", query)).unwrap();
      assert!(
        matches!(
          ClassifierBuilder::from_url(&url),
          Err(ClassifierError::InvalidQuery(_))
        ),
        "{}",
        query
      );
    }
  }

  fn tensor_2x2() -> TensorBuffer {
    // 红 绿 / 蓝 白
    let pixels = [0xFFFF_0000, 0xFF00_FF00, 0xFF00_00FF, 0xFFFF_FFFF];
    TensorBuffer::from_argb_pixels(2, &pixels, Default::default()).unwrap()
  }

  #[test]
  fn test_input_array_nhwc() {
    let input = input_array(&tensor_2x2(), TensorLayout::Nhwc).unwrap();
    assert_eq!(input.shape(), &[1, 2, 2, 3]);
    assert_eq!(input[[0, 0, 0, 0]], 1.0);
    assert_eq!(input[[0, 0, 0, 1]], 0.0);
    assert_eq!(input[[0, 0, 1, 1]], 1.0);
    assert_eq!(input[[0, 1, 0, 2]], 1.0);
    assert_eq!(input[[0, 1, 0, 0]], 0.0);
    assert_eq!(input[[0, 1, 1, 0]], 1.0);
  }

  #[test]
  fn test_input_array_nchw() {
    let input = input_array(&tensor_2x2(), TensorLayout::Nchw).unwrap();
    assert_eq!(input.shape(), &[1, 3, 2, 2]);
    // 红色平面
    assert_eq!(input[[0, 0, 0, 0]], 1.0);
    assert_eq!(input[[0, 0, 0, 1]], 0.0);
    assert_eq!(input[[0, 0, 1, 1]], 1.0);
    // 绿色平面
    assert_eq!(input[[0, 1, 0, 1]], 1.0);
    assert_eq!(input[[0, 1, 1, 0]], 0.0);
    // 蓝色平面
    assert_eq!(input[[0, 2, 1, 0]], 1.0);
    assert_eq!(input[[0, 2, 0, 0]], 0.0);
  }

  #[test]
  fn test_flatten_output_keeps_order() {
    let output = ndarray::arr2(&[[0.1f32, 0.7, 0.2]]).into_dyn();
    assert_eq!(flatten_output(output.view()), vec![0.1, 0.7, 0.2]);

    let transposed = ndarray::arr2(&[[0.1f32], [0.7], [0.2]]).reversed_axes().into_dyn();
    assert_eq!(flatten_output(transposed.view()), vec![0.1, 0.7, 0.2]);
  }

  #[test]
  fn test_missing_labels_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = ClassifierBuilder::new(dir.path().join("m.onnx"), dir.path().join("label.txt"))
      .build()
      .unwrap_err();
    assert!(matches!(err, ClassifierError::Label(_)));
  }

  #[test]
  fn test_missing_model_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let labels = dir.path().join("label.txt");
    let mut file = File::create(&labels).unwrap();
    writeln!(file, "cat\ndog").unwrap();

    let err = ClassifierBuilder::new(dir.path().join("m.onnx"), &labels)
      .build()
      .unwrap_err();
    assert!(matches!(
      err,
      ClassifierError::Onnx(OnnxError::ModelLoadError(_))
    ));
  }

  #[test]
  fn test_zero_size_rejected_before_loading() {
    let err = ClassifierBuilder::new("/nonexistent/m.onnx", "/nonexistent/label.txt")
      .input_size(0)
      .build()
      .unwrap_err();
    assert!(matches!(err, ClassifierError::InvalidInputSize(0)));
  }

  #[test]
  fn test_layout_parse() {
    assert_eq!("nhwc".parse::<TensorLayout>(), Ok(TensorLayout::Nhwc));
    assert_eq!("NCHW".parse::<TensorLayout>(), Ok(TensorLayout::Nchw));
    assert!("hwc".parse::<TensorLayout>().is_err());
  }
}
