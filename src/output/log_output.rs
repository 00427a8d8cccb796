// 该文件是 Maogou （猫狗识别） 项目的一部分。
// src/output/log_output.rs - 日志输出
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

use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, frame::ImageFrame, model::Recognition, output::Render,
};

#[derive(Error, Debug)]
pub enum LogOutputError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 记录全部结果，并在标准输出打印置信度最高的一项
pub struct LogOutput {
  quiet: bool,
}

impl FromUrlWithScheme for LogOutput {
  const SCHEME: &'static str = "log";
}

impl FromUrl for LogOutput {
  type Error = LogOutputError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(LogOutputError::SchemeMismatch(format!(
        "期望输出方式 '{}', 实际输出方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    let quiet = uri.query_pairs().any(|(k, _)| k == "quiet");
    Ok(LogOutput { quiet })
  }
}

impl LogOutput {
  pub fn new() -> Self {
    Self { quiet: false }
  }

  /// 标准输出中显示的一行
  pub fn headline(result: &[Recognition]) -> String {
    match result.first() {
      Some(top) => top.to_string(),
      None => "未识别到任何类别".to_string(),
    }
  }
}

impl Default for LogOutput {
  fn default() -> Self {
    Self::new()
  }
}

impl Render<ImageFrame, Vec<Recognition>> for LogOutput {
  type Error = LogOutputError;

  fn render_result(
    &self,
    frame: &ImageFrame,
    result: &Vec<Recognition>,
  ) -> Result<(), Self::Error> {
    if result.is_empty() {
      warn!("{}: 未识别到任何类别", frame.source);
    }
    for (rank, item) in result.iter().enumerate() {
      info!("{} #{} [{}] {}", frame.source, rank + 1, item.id, item);
    }
    if !self.quiet {
      println!("{}: {}", frame.source, Self::headline(result));
    }
    Ok(())
  }
}
