// 该文件是 Guanxi （关系评估） 项目的一部分。
// src/model/scoring.rs - HOI 得分合成
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

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use thiserror::Error;

/// 每行: 人框 4 + 物框 4 + 得分 1
pub const BOXES_SCORES_COLS: usize = 9;

#[derive(Error, Debug)]
pub enum ScoringError {
  #[error("概率矩阵形状不一致: 人 {human:?}, 物 {object:?}, 关系 {relation:?}")]
  ShapeMismatch {
    human: (usize, usize),
    object: (usize, usize),
    relation: (usize, usize),
  },
  #[error("候选数量不一致: 期望 {expected}, 实际 {actual}")]
  CandidateMismatch { expected: usize, actual: usize },
  #[error("第 {candidate} 个候选的 HOI 类别 {hoi_idx} 超出范围 (共 {num_hoi} 类)")]
  HoiIndexOutOfRange {
    candidate: usize,
    hoi_idx: usize,
    num_hoi: usize,
  },
  #[error("数组拼接错误: {0}")]
  ShapeError(#[from] ndarray::ShapeError),
}

/// 人检测概率 × 物检测概率 × 关系概率
pub fn combine_hoi_prob(
  human_prob_vec: ArrayView2<f32>,
  object_prob_vec: ArrayView2<f32>,
  relation_prob_vec: ArrayView2<f32>,
) -> Result<Array2<f32>, ScoringError> {
  let human = human_prob_vec.dim();
  let object = object_prob_vec.dim();
  let relation = relation_prob_vec.dim();
  if human != object || human != relation {
    return Err(ScoringError::ShapeMismatch {
      human,
      object,
      relation,
    });
  }

  Ok(&(&human_prob_vec * &object_prob_vec) * &relation_prob_vec)
}

/// 取出每个候选在其目标 HOI 类别上的得分
pub fn select_scores(
  hoi_prob: ArrayView2<f32>,
  hoi_idx: ArrayView1<usize>,
) -> Result<Array1<f32>, ScoringError> {
  let (num_cand, num_hoi) = hoi_prob.dim();
  if hoi_idx.len() != num_cand {
    return Err(ScoringError::CandidateMismatch {
      expected: num_cand,
      actual: hoi_idx.len(),
    });
  }

  hoi_idx
    .iter()
    .enumerate()
    .map(|(candidate, &idx)| {
      if idx >= num_hoi {
        return Err(ScoringError::HoiIndexOutOfRange {
          candidate,
          hoi_idx: idx,
          num_hoi,
        });
      }
      Ok(hoi_prob[[candidate, idx]])
    })
    .collect()
}

/// 拼接为 (n, 9): [人框 | 物框 | 得分]
pub fn boxes_with_scores<'a>(
  human_box: ArrayView2<'a, f32>,
  object_box: ArrayView2<'a, f32>,
  scores: ArrayView1<'a, f32>,
) -> Result<Array2<f32>, ScoringError> {
  let n = scores.len();
  for actual in [human_box.nrows(), object_box.nrows()] {
    if actual != n {
      return Err(ScoringError::CandidateMismatch {
        expected: n,
        actual,
      });
    }
  }

  Ok(ndarray::concatenate(
    Axis(1),
    &[human_box, object_box, scores.insert_axis(Axis(1))],
  )?)
}

#[cfg(test)]
mod tests {
  use super::*;
  use approx::assert_relative_eq;
  use ndarray::array;

  #[test]
  fn multiplies_three_sources_elementwise() {
    let human = array![[0.9f32, 0.9], [0.5, 0.5]];
    let object = array![[0.8f32, 0.8], [0.4, 0.4]];
    let relation = array![[0.5f32, 1.0], [0.25, 0.0]];
    let hoi = combine_hoi_prob(human.view(), object.view(), relation.view()).unwrap();
    assert_relative_eq!(hoi[[0, 0]], 0.36, epsilon = 1e-6);
    assert_relative_eq!(hoi[[0, 1]], 0.72, epsilon = 1e-6);
    assert_relative_eq!(hoi[[1, 0]], 0.05, epsilon = 1e-6);
    assert_eq!(hoi[[1, 1]], 0.0);
  }

  #[test]
  fn rejects_mismatched_probability_shapes() {
    let a = Array2::<f32>::ones((2, 3));
    let b = Array2::<f32>::ones((2, 4));
    assert!(matches!(
      combine_hoi_prob(a.view(), a.view(), b.view()),
      Err(ScoringError::ShapeMismatch { .. })
    ));
  }

  #[test]
  fn selects_score_at_assigned_class() {
    let hoi = array![[0.1f32, 0.2, 0.3], [0.4, 0.5, 0.6]];
    let scores = select_scores(hoi.view(), array![2usize, 0].view()).unwrap();
    assert_eq!(scores, array![0.3f32, 0.4]);

    assert!(matches!(
      select_scores(hoi.view(), array![0usize, 3].view()),
      Err(ScoringError::HoiIndexOutOfRange { candidate: 1, hoi_idx: 3, num_hoi: 3 })
    ));
  }

  #[test]
  fn concatenates_boxes_and_scores() {
    let human = array![[0f32, 1., 2., 3.]];
    let object = array![[4f32, 5., 6., 7.]];
    let scores = array![0.5f32];
    let out = boxes_with_scores(human.view(), object.view(), scores.view()).unwrap();
    assert_eq!(out.dim(), (1, BOXES_SCORES_COLS));
    assert_eq!(out.row(0).to_vec(), vec![0., 1., 2., 3., 4., 5., 6., 7., 0.5]);
  }

  #[test]
  fn concatenates_views_from_separate_owners() {
    let scores = {
      let hoi = array![[0.1f32, 0.2], [0.3, 0.4]];
      select_scores(hoi.view(), array![1usize, 0].view()).unwrap()
    };
    let boxes = array![[0f32, 0., 1., 1.], [2., 2., 3., 3.]];
    let out = boxes_with_scores(boxes.view(), boxes.slice(ndarray::s![.., ..]), scores.view()).unwrap();
    assert_eq!(out.column(8).to_vec(), vec![0.2f32, 0.3]);
    assert_eq!(&out.row(1).to_vec()[..4], &[2f32, 2., 3., 3.]);
  }

  #[test]
  fn empty_candidates_give_empty_rows() {
    let boxes = Array2::<f32>::zeros((0, 4));
    let hoi = Array2::<f32>::zeros((0, 5));
    let scores = select_scores(hoi.view(), Array1::<usize>::zeros(0).view()).unwrap();
    let out = boxes_with_scores(boxes.view(), boxes.view(), scores.view()).unwrap();
    assert_eq!(out.dim(), (0, BOXES_SCORES_COLS));
  }
}
