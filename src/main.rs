// 该文件是 Maogou （猫狗识别） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use maogou::{
  input::ImageFileInput,
  model::ClassifierBuilder,
  output::{LogOutput, Render},
};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  info!("模型文件路径: {}", args.model.display());
  info!("标签文件路径: {}", args.labels.display());
  info!("输入尺寸: {}", args.input_size);

  let classifier = ClassifierBuilder::new(&args.model, &args.labels)
    .input_size(args.input_size)
    .threads(args.threads)
    .acceleration(!args.no_accel)
    .build()?;
  let output = LogOutput::new();

  let mut failures = 0usize;
  for path in &args.images {
    let frame = match ImageFileInput::open(path).map(|mut input| input.next()) {
      Ok(Some(frame)) => frame,
      Ok(None) => continue,
      Err(e) => {
        error!("无法读取图像 {}: {}", path.display(), e);
        failures += 1;
        continue;
      }
    };

    let now = std::time::Instant::now();
    let result = classifier.classify(&frame.image)?;
    info!("推理完成，耗时: {:.2?}", now.elapsed());
    output.render_result(&frame, &result)?;
  }

  if failures > 0 {
    anyhow::bail!("{} 张图像读取失败", failures);
  }
  Ok(())
}
