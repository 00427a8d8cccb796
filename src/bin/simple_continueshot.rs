// 该文件是 Maogou （猫狗识别） 项目的一部分。
// src/bin/simple_continueshot.rs - 连续图像识别
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
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  thread,
  time::Duration,
};

use anyhow::Result;
use clap::Parser;
use url::Url;

use maogou::{
  FromUrl,
  model::ClassifierBuilder,
  task::{ContinuousTask, Task},
};
use tracing::{info, warn};

/// Maogou 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// ONNX 模型地址
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源，例如 folder:///data/pets
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径
  #[arg(long, value_name = "OUTPUT", default_value = "log:")]
  pub output: Url,

  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<usize>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let input_image = maogou::input::InputWrapper::from_url(&args.input)?;
  let model = ClassifierBuilder::from_url(&args.model)?.build()?;
  let output = maogou::output::OutputWrapper::from_url(&args.output)?;

  let stop = Arc::new(AtomicBool::new(false));
  let signal = Arc::clone(&stop);
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    signal.store(true, Ordering::SeqCst);
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })
  .map_err(|e| anyhow::anyhow!("无法设置 Ctrl-C 处理器: {}", e))?;

  ContinuousTask::default()
    .with_frame_number(args.frame_number)
    .with_stop(stop)
    .run_task(input_image, model, output)?;

  Ok(())
}
