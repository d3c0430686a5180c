// 该文件是 Guanxi （关系评估） 项目的一部分。
// src/sample.rs - 单张图像的候选 HOI 样本定义
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

use ndarray::{Array1, Array2};
use thiserror::Error;

const BOX_COORDS: usize = 4;

#[derive(Error, Debug)]
pub enum SampleError {
  #[error("图像 {global_id} 的字段 {field} 行数为 {actual}, 期望 {expected}")]
  RowMismatch {
    global_id: String,
    field: &'static str,
    expected: usize,
    actual: usize,
  },
  #[error("图像 {global_id} 的字段 {field} 列数为 {actual}, 期望 {expected}")]
  ColumnMismatch {
    global_id: String,
    field: &'static str,
    expected: usize,
    actual: usize,
  },
  #[error("图像 {global_id} 第 {candidate} 个候选的 HOI 类别 {hoi_idx} 超出范围 (共 {num_hoi} 类)")]
  HoiIndexOutOfRange {
    global_id: String,
    candidate: usize,
    hoi_idx: usize,
    num_hoi: usize,
  },
  #[error("图像 {global_id} 的 HOI 类别 {hoi} 候选区间 [{start}, {end}) 无效 (共 {num_candidates} 个候选)")]
  InvalidRange {
    global_id: String,
    hoi: usize,
    start: i64,
    end: i64,
    num_candidates: usize,
  },
}

/// 一张图像的全部候选人-物对
#[derive(Debug, Clone)]
pub struct HoiSample {
  pub global_id: String,
  pub human_feat: Array2<f32>,
  pub object_feat: Array2<f32>,
  pub box_feat: Option<Array2<f32>>,
  /// 人检测置信度，已展开到 HOI 类别空间 (n, H)
  pub human_prob_vec: Array2<f32>,
  /// 物体检测置信度，已展开到 HOI 类别空间 (n, H)
  pub object_prob_vec: Array2<f32>,
  pub hoi_idx: Array1<usize>,
  pub human_box: Array2<f32>, // [x1, y1, x2, y2]
  pub object_box: Array2<f32>,
  /// 每个 HOI 类别在展平候选数组中的 [start, end) 区间
  pub start_end_ids: Array2<i64>,
}

impl HoiSample {
  pub fn num_candidates(&self) -> usize {
    self.hoi_idx.len()
  }

  pub fn num_hoi_classes(&self) -> usize {
    self.human_prob_vec.ncols()
  }

  pub fn validate(&self) -> Result<(), SampleError> {
    let n = self.num_candidates();
    let num_hoi = self.num_hoi_classes();

    let mut rows: Vec<(&'static str, usize)> = vec![
      ("human_feat", self.human_feat.nrows()),
      ("object_feat", self.object_feat.nrows()),
      ("human_prob_vec", self.human_prob_vec.nrows()),
      ("object_prob_vec", self.object_prob_vec.nrows()),
      ("human_box", self.human_box.nrows()),
      ("object_box", self.object_box.nrows()),
    ];
    if let Some(box_feat) = &self.box_feat {
      rows.push(("box_feat", box_feat.nrows()));
    }
    for (field, actual) in rows {
      if actual != n {
        return Err(SampleError::RowMismatch {
          global_id: self.global_id.clone(),
          field,
          expected: n,
          actual,
        });
      }
    }

    let cols = [
      ("object_prob_vec", self.object_prob_vec.ncols(), num_hoi),
      ("human_box", self.human_box.ncols(), BOX_COORDS),
      ("object_box", self.object_box.ncols(), BOX_COORDS),
      ("start_end_ids", self.start_end_ids.ncols(), 2),
    ];
    for (field, actual, expected) in cols {
      if actual != expected {
        return Err(SampleError::ColumnMismatch {
          global_id: self.global_id.clone(),
          field,
          expected,
          actual,
        });
      }
    }

    if let Some((candidate, &hoi_idx)) = self
      .hoi_idx
      .iter()
      .enumerate()
      .find(|(_, idx)| **idx >= num_hoi)
    {
      return Err(SampleError::HoiIndexOutOfRange {
        global_id: self.global_id.clone(),
        candidate,
        hoi_idx,
        num_hoi,
      });
    }

    for (hoi, range) in self.start_end_ids.outer_iter().enumerate() {
      let (start, end) = (range[0], range[1]);
      if start < 0 || start > end || end > n as i64 {
        return Err(SampleError::InvalidRange {
          global_id: self.global_id.clone(),
          hoi,
          start,
          end,
          num_candidates: n,
        });
      }
    }

    Ok(())
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;
  use ndarray::array;

  /// 两个候选、三个 HOI 类别的小样本
  pub(crate) fn tiny_sample() -> HoiSample {
    HoiSample {
      global_id: "HICO_test2015_00000001".to_string(),
      human_feat: Array2::ones((2, 3)),
      object_feat: Array2::ones((2, 3)),
      box_feat: None,
      human_prob_vec: array![[0.9, 0.9, 0.9], [0.5, 0.5, 0.5]],
      object_prob_vec: array![[0.8, 0.8, 0.8], [0.4, 0.4, 0.4]],
      hoi_idx: array![1, 2],
      human_box: array![[0., 0., 10., 10.], [1., 1., 5., 5.]],
      object_box: array![[5., 5., 20., 20.], [2., 2., 8., 8.]],
      start_end_ids: array![[0, 0], [0, 1], [1, 2]],
    }
  }

  #[test]
  fn tiny_sample_is_valid() {
    let sample = tiny_sample();
    assert_eq!(sample.num_candidates(), 2);
    assert_eq!(sample.num_hoi_classes(), 3);
    sample.validate().unwrap();
  }

  #[test]
  fn empty_sample_is_valid() {
    let sample = HoiSample {
      global_id: "empty".to_string(),
      human_feat: Array2::zeros((0, 3)),
      object_feat: Array2::zeros((0, 3)),
      box_feat: None,
      human_prob_vec: Array2::zeros((0, 3)),
      object_prob_vec: Array2::zeros((0, 3)),
      hoi_idx: Array1::zeros(0),
      human_box: Array2::zeros((0, 4)),
      object_box: Array2::zeros((0, 4)),
      start_end_ids: Array2::zeros((3, 2)),
    };
    sample.validate().unwrap();
  }

  #[test]
  fn rejects_row_mismatch() {
    let mut sample = tiny_sample();
    sample.object_feat = Array2::ones((3, 3));
    match sample.validate() {
      Err(SampleError::RowMismatch { field, actual, .. }) => {
        assert_eq!(field, "object_feat");
        assert_eq!(actual, 3);
      }
      other => panic!("unexpected result: {:?}", other),
    }
  }

  #[test]
  fn rejects_hoi_index_out_of_range() {
    let mut sample = tiny_sample();
    sample.hoi_idx = array![0, 3];
    assert!(matches!(
      sample.validate(),
      Err(SampleError::HoiIndexOutOfRange { candidate: 1, .. })
    ));
  }

  #[test]
  fn rejects_range_past_candidates() {
    let mut sample = tiny_sample();
    sample.start_end_ids = array![[0, 0], [0, 1], [1, 5]];
    assert!(matches!(
      sample.validate(),
      Err(SampleError::InvalidRange { hoi: 2, end: 5, .. })
    ));
  }

  #[test]
  fn rejects_reversed_or_negative_range() {
    let mut sample = tiny_sample();
    sample.start_end_ids = array![[0, 0], [1, 0], [1, 2]];
    assert!(matches!(
      sample.validate(),
      Err(SampleError::InvalidRange { hoi: 1, start: 1, end: 0, .. })
    ));

    sample.start_end_ids = array![[-1, 0], [0, 1], [1, 2]];
    assert!(matches!(
      sample.validate(),
      Err(SampleError::InvalidRange { hoi: 0, start: -1, .. })
    ));
  }

  #[test]
  fn rejects_bad_box_width() {
    let mut sample = tiny_sample();
    sample.human_box = Array2::zeros((2, 5));
    assert!(matches!(
      sample.validate(),
      Err(SampleError::ColumnMismatch { field: "human_box", .. })
    ));
  }
}
