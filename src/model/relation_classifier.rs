// 该文件是 Guanxi （关系评估） 项目的一部分。
// src/model/relation_classifier.rs - 关系分类网络
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

use candle_core::Tensor;
use candle_nn::{Linear, Module, VarBuilder, linear};
use thiserror::Error;
use tracing::debug;

use crate::model::config::RelationModelConfig;

#[derive(Error, Debug)]
pub enum RelationClassifierError {
  #[error("框感知模型缺少框特征")]
  MissingBoxFeatures,
  #[error("张量错误: {0}")]
  CandleError(#[from] candle_core::Error),
}

/// 单路特征的两层感知机: fc1 -> ReLU -> fc2
struct StreamMlp {
  fc1: Linear,
  fc2: Linear,
}

impl StreamMlp {
  fn new(
    in_dim: usize,
    hidden_dim: usize,
    out_dim: usize,
    vb: VarBuilder,
  ) -> candle_core::Result<Self> {
    let fc1 = linear(in_dim, hidden_dim, vb.pp("fc1"))?;
    let fc2 = linear(hidden_dim, out_dim, vb.pp("fc2"))?;
    Ok(StreamMlp { fc1, fc2 })
  }
}

impl Module for StreamMlp {
  fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
    self.fc2.forward(&self.fc1.forward(xs)?.relu()?)
  }
}

/// 分类器的输入特征
pub struct RelationFeatures<'a> {
  pub human_rcnn: &'a Tensor,
  pub object_rcnn: &'a Tensor,
  pub box_feat: Option<&'a Tensor>,
}

/// 各路特征的 logit 相加后经 sigmoid 得到每个关系类别的概率
pub struct RelationClassifier {
  human_rcnn: StreamMlp,
  object_rcnn: StreamMlp,
  box_stream: Option<StreamMlp>,
}

impl RelationClassifier {
  /// 参数名形如 `human_rcnn.fc1.weight`，框感知模型额外读取 `box.*`
  pub fn new(config: &RelationModelConfig, vb: VarBuilder) -> candle_core::Result<Self> {
    let human_rcnn = StreamMlp::new(
      config.human_feat_dim,
      config.hidden_dim,
      config.num_relations,
      vb.pp("human_rcnn"),
    )?;
    let object_rcnn = StreamMlp::new(
      config.object_feat_dim,
      config.hidden_dim,
      config.num_relations,
      vb.pp("object_rcnn"),
    )?;
    let box_stream = if config.box_aware {
      debug!("构建框感知关系分类器");
      Some(StreamMlp::new(
        config.box_feat_dim,
        config.hidden_dim,
        config.num_relations,
        vb.pp("box"),
      )?)
    } else {
      None
    };

    Ok(RelationClassifier {
      human_rcnn,
      object_rcnn,
      box_stream,
    })
  }

  pub fn is_box_aware(&self) -> bool {
    self.box_stream.is_some()
  }

  /// 返回 (n, R) 的关系概率
  pub fn forward(&self, feats: &RelationFeatures) -> Result<Tensor, RelationClassifierError> {
    let mut logits = self
      .human_rcnn
      .forward(feats.human_rcnn)?
      .add(&self.object_rcnn.forward(feats.object_rcnn)?)?;

    if let Some(box_stream) = &self.box_stream {
      let box_feat = feats
        .box_feat
        .ok_or(RelationClassifierError::MissingBoxFeatures)?;
      logits = logits.add(&box_stream.forward(box_feat)?)?;
    }

    Ok(candle_nn::ops::sigmoid(&logits)?)
  }
}
