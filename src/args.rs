// 该文件是 Guanxi （关系评估） 项目的一部分。
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

use clap::Parser;
use url::Url;

/// Guanxi 评估参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 关系分类模型
  /// 例如: relation:///exp/rel/model.safetensors?config=/exp/rel/model.json&model_num=25000
  #[arg(long, value_name = "MODEL")]
  pub model: Url,

  /// 特征输入
  /// 例如: features:///data/hico/feats_test.npz?subset=test&split=/data/hico/split_ids.json
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 结果输出
  /// 支持:
  /// - npz:///exp/rel 或 npz:///exp/rel/pred.npz
  /// - jsonl:///exp/rel 或 jsonl:///exp/rel/pred.jsonl
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,

  /// 最多评估的图像数，不指定表示全部
  #[arg(long, value_name = "COUNT")]
  pub max_samples: Option<usize>,

  /// 每隔多少张图像输出一次进度
  #[arg(long, default_value = "100", value_name = "COUNT")]
  pub log_every: usize,
}
