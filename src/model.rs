// 该文件是 Guanxi （关系评估） 项目的一部分。
// src/model.rs - 模型
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

use ndarray::{Array2, ArrayView1};

use crate::model::scoring::BOXES_SCORES_COLS;

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 一张图像的 HOI 检测结果
#[derive(Debug, Clone)]
pub struct HoiDetections {
  pub global_id: String,
  /// (n, 9): [人框 x1 y1 x2 y2 | 物框 x1 y1 x2 y2 | 得分]
  pub human_obj_boxes_scores: Array2<f32>,
  pub start_end_ids: Array2<i64>,
}

impl HoiDetections {
  pub fn num_candidates(&self) -> usize {
    self.human_obj_boxes_scores.nrows()
  }

  pub fn is_empty(&self) -> bool {
    self.num_candidates() == 0
  }

  pub fn scores(&self) -> ArrayView1<'_, f32> {
    self.human_obj_boxes_scores.column(BOXES_SCORES_COLS - 1)
  }
}

pub mod config;
pub mod gather_relation;
pub mod relation_classifier;
pub mod scoring;

mod evaluator;
pub use self::config::RelationModelConfig;
pub use self::evaluator::{RelationEvaluator, RelationEvaluatorBuilder, RelationModelError};
