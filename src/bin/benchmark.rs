// 该文件是 Guanxi （关系评估） 项目的一部分。
// src/bin/benchmark.rs - 推理耗时基准测试
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

use anyhow::Result;
use clap::Parser;
use url::Url;

use guanxi::{
  FromUrl,
  input::InputWrapper,
  model::RelationEvaluatorBuilder,
  task::{BenchmarkTask, Task},
};
use tracing::info;

/// Guanxi 基准测试参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 关系分类模型
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 特征输入，只使用第一张图像
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 重复推理次数
  #[arg(long, default_value = "100", value_name = "COUNT")]
  pub repeat: usize,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型: {}", args.model);
  info!("输入来源: {}", args.input);

  let model = RelationEvaluatorBuilder::from_url(&args.model)?.build()?;
  let input = InputWrapper::from_url(&args.input)?;

  let mean = BenchmarkTask::default()
    .with_repeat(args.repeat)
    .run_task(input.into_samples(), model, ())?;
  info!("平均推理时间: {:.2?}", mean);

  Ok(())
}
