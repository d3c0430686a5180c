// 该文件是 Guanxi （关系评估） 项目的一部分。
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
use tracing::{info, warn};

use guanxi::{
  FromUrl,
  input::InputWrapper,
  model::RelationEvaluatorBuilder,
  output::{OutputWrapper, RunTag},
  task::{EvalTask, Task},
};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  info!("Guanxi HOI 关系分类评估");
  info!("模型: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  info!("正在加载模型...");
  let model = RelationEvaluatorBuilder::from_url(&args.model)?.build()?;

  info!("正在打开数据集...");
  let input = InputWrapper::from_url(&args.input)?;
  if input.is_empty() {
    warn!("数据集为空");
  }

  let tag = RunTag::new(input.subset(), model.model_num());
  let output = OutputWrapper::open(&args.output, &tag)?;
  let output_path = output.path().to_path_buf();

  let summary = EvalTask::default()
    .with_max_samples(args.max_samples)
    .with_log_every(args.log_every)
    .with_ctrlc()?
    .run_task(input.into_samples(), model, output)?;

  if summary.interrupted {
    warn!("评估被中断，结果只包含已处理的图像");
  }
  info!("总图像数: {}", summary.images);
  info!("总候选数: {}", summary.candidates);
  info!("输出文件: {}", output_path.display());

  Ok(())
}
