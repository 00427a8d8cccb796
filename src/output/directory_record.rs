// 该文件是 Maogou （猫狗识别） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme, frame::ImageFrame, model::Recognition, output::Render,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("帧计数器锁已损坏")]
  CounterPoisoned,
}

#[derive(Serialize)]
struct Record<'a> {
  source: &'a str,
  width: u32,
  height: u32,
  timestamp: String,
  results: &'a [Recognition],
}

/// 每帧写一个 JSON 记录到 `<dir>/YYYY/MM/DD/`
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  frame_counter: Mutex<u16>,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(uri.path()),
      frame_counter: Mutex::new(0),
      always,
    })
  }
}

impl DirectoryRecordOutput {
  fn frame_id(&self) -> Result<u16, DirectoryRecordOutputError> {
    let mut counter = self
      .frame_counter
      .lock()
      .map_err(|_| DirectoryRecordOutputError::CounterPoisoned)?;
    *counter = counter.wrapping_add(1);
    Ok(*counter)
  }

  fn frame_path(&self, now: &DateTime<Utc>) -> Result<PathBuf, DirectoryRecordOutputError> {
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    if !directory.exists() {
      std::fs::create_dir_all(&directory)?;
    }

    Ok(directory.join(format!(
      "{}-{:04X}.json",
      now.format("%H-%M-%S"),
      self.frame_id()?
    )))
  }
}

impl Render<ImageFrame, Vec<Recognition>> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(
    &self,
    frame: &ImageFrame,
    result: &Vec<Recognition>,
  ) -> Result<(), Self::Error> {
    if !self.always && result.is_empty() {
      return Ok(());
    }

    let now = Utc::now();
    let path = self.frame_path(&now)?;
    let record = Record {
      source: &frame.source,
      width: frame.width(),
      height: frame.height(),
      timestamp: now.to_rfc3339(),
      results: result,
    };
    std::fs::write(&path, serde_json::to_vec_pretty(&record)?)?;
    debug!("记录已写入: {}", path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::DynamicImage;
  use std::path::Path;
  use url::Url;

  fn output(dir: &Path, always: bool) -> DirectoryRecordOutput {
    let query = if always { "?always" } else { "" };
    let url = Url::parse(&format!("folder://{}{}", dir.display(), query)).unwrap();
    DirectoryRecordOutput::from_url(&url).unwrap()
  }

  fn records(dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
      for entry in std::fs::read_dir(current).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
          stack.push(path);
        } else {
          found.push(path);
        }
      }
    }
    found
  }

  #[test]
  fn test_writes_json_record() {
    let dir = tempfile::tempdir().unwrap();
    let frame = ImageFrame::new("cat.png", DynamicImage::new_rgb8(6, 4));
    let result = vec![Recognition::new("0", "cat", 0.9)];
    output(dir.path(), false).render_result(&frame, &result).unwrap();

    let files = records(dir.path());
    assert_eq!(files.len(), 1);
    let text = std::fs::read_to_string(&files[0]).unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["source"], "cat.png");
    assert_eq!(value["width"], 6);
    assert_eq!(value["results"][0]["title"], "cat");
    assert_eq!(value["results"][0]["id"], "0");
  }

  #[test]
  fn test_empty_result_skipped_unless_always() {
    let dir = tempfile::tempdir().unwrap();
    let frame = ImageFrame::new("empty.png", DynamicImage::new_rgb8(1, 1));
    output(dir.path(), false).render_result(&frame, &Vec::new()).unwrap();
    assert!(records(dir.path()).is_empty());

    output(dir.path(), true).render_result(&frame, &Vec::new()).unwrap();
    assert_eq!(records(dir.path()).len(), 1);
  }

  #[test]
  fn test_frame_ids_distinct() {
    let dir = tempfile::tempdir().unwrap();
    let out = output(dir.path(), true);
    let frame = ImageFrame::new("x.png", DynamicImage::new_rgb8(1, 1));
    for _ in 0..3 {
      out.render_result(&frame, &Vec::new()).unwrap();
    }
    assert_eq!(records(dir.path()).len(), 3);
  }
}
