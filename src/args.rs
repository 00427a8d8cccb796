// 该文件是 Maogou （猫狗识别） 项目的一部分。
// src/args.rs - 项目参数配置
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

use std::path::PathBuf;

use clap::Parser;

/// Maogou 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// ONNX 模型文件路径
  #[arg(long, default_value = "converted_model.onnx", value_name = "FILE")]
  pub model: PathBuf,

  /// 标签文件路径（每行一个标签）
  #[arg(long, default_value = "label.txt", value_name = "FILE")]
  pub labels: PathBuf,

  /// 模型输入边长（像素）
  #[arg(long, default_value = "224", value_name = "PIXELS")]
  pub input_size: u32,

  /// 推理线程数
  #[arg(long, default_value = "5", value_name = "COUNT")]
  pub threads: usize,

  /// 禁用硬件加速
  #[arg(long)]
  pub no_accel: bool,

  /// 待识别的图像文件
  #[arg(required = true, value_name = "IMAGE")]
  pub images: Vec<PathBuf>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let args = Args::try_parse_from(["maogou", "cat.png"]).unwrap();
    assert_eq!(args.model, PathBuf::from("converted_model.onnx"));
    assert_eq!(args.labels, PathBuf::from("label.txt"));
    assert_eq!(args.input_size, 224);
    assert_eq!(args.threads, 5);
    assert!(!args.no_accel);
    assert_eq!(args.images, vec![PathBuf::from("cat.png")]);
  }

  #[test]
  fn test_images_required() {
    assert!(Args::try_parse_from(["maogou"]).is_err());
  }
}
