// 该文件是 Guanxi （关系评估） 项目的一部分。
// src/output/npz_record.rs - 预测结果 NPZ 记录输出
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
  collections::HashSet,
  fs::File,
  io::{BufWriter, Write},
  path::{Path, PathBuf},
  sync::Mutex,
};

use chrono::Utc;
use ndarray_npy::{NpzWriter, WriteNpzError};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::HoiDetections,
  output::{Render, RunTag, ensure_parent},
  sample::HoiSample,
  utils::url_path,
};

const NPZ_EXTENSION: &str = "npz";

#[derive(Error, Debug)]
pub enum NpzRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("NPZ 写入错误: {0}")]
  NpzError(#[from] WriteNpzError),
  #[error("元数据写入错误: {0}")]
  MetaError(#[from] serde_json::Error),
  #[error("图像 {0} 已写入过")]
  DuplicateGroup(String),
  #[error("输入图像 {0} 与结果图像 {1} 不一致")]
  SampleMismatch(String, String),
  #[error("记录状态锁已损坏")]
  Poisoned,
}

pub struct NpzRecordOutputBuilder {
  path: PathBuf,
  compressed: bool,
}

impl FromUrlWithScheme for NpzRecordOutputBuilder {
  const SCHEME: &'static str = "npz";
}

impl FromUrl for NpzRecordOutputBuilder {
  type Error = NpzRecordOutputError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      error!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      );
      return Err(NpzRecordOutputError::SchemeMismatch);
    }

    let compressed = uri.query_pairs().any(|(k, _)| k == "compressed");

    Ok(NpzRecordOutputBuilder {
      path: url_path(uri),
      compressed,
    })
  }
}

impl NpzRecordOutputBuilder {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    NpzRecordOutputBuilder {
      path: path.into(),
      compressed: false,
    }
  }

  pub fn build(self, tag: &RunTag) -> Result<NpzRecordOutput, NpzRecordOutputError> {
    let path = tag.resolve(&self.path, NPZ_EXTENSION);
    ensure_parent(&path)?;
    info!("创建预测结果文件: {}", path.display());

    let file = BufWriter::new(File::create(&path)?);
    let writer = if self.compressed {
      NpzWriter::new_compressed(file)
    } else {
      NpzWriter::new(file)
    };

    Ok(NpzRecordOutput {
      path,
      tag: tag.clone(),
      state: Mutex::new(RecordState {
        writer,
        written: HashSet::new(),
        num_candidates: 0,
      }),
    })
  }
}

struct RecordState {
  writer: NpzWriter<BufWriter<File>>,
  written: HashSet<String>,
  num_candidates: usize,
}

#[derive(Serialize)]
struct RecordMeta<'a> {
  subset: &'a str,
  model_num: u64,
  num_images: usize,
  num_candidates: usize,
  created_at: String,
}

/// 每张图像写入 `{global_id}/human_obj_boxes_scores` 与 `{global_id}/start_end_ids`
pub struct NpzRecordOutput {
  path: PathBuf,
  tag: RunTag,
  state: Mutex<RecordState>,
}

impl NpzRecordOutput {
  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn meta_path(&self) -> PathBuf {
    let mut name = self
      .path
      .file_name()
      .map(|n| n.to_os_string())
      .unwrap_or_default();
    name.push(".meta.json");
    self.path.with_file_name(name)
  }
}

impl Render<HoiSample, HoiDetections> for NpzRecordOutput {
  type Error = NpzRecordOutputError;

  fn render_result(&self, input: &HoiSample, result: &HoiDetections) -> Result<(), Self::Error> {
    if input.global_id != result.global_id {
      return Err(NpzRecordOutputError::SampleMismatch(
        input.global_id.clone(),
        result.global_id.clone(),
      ));
    }

    let mut state = self
      .state
      .lock()
      .map_err(|_| NpzRecordOutputError::Poisoned)?;
    if !state.written.insert(result.global_id.clone()) {
      error!("图像 {} 已写入过", result.global_id);
      return Err(NpzRecordOutputError::DuplicateGroup(
        result.global_id.clone(),
      ));
    }

    let id = &result.global_id;
    state.writer.add_array(
      format!("{id}/human_obj_boxes_scores.npy"),
      &result.human_obj_boxes_scores,
    )?;
    state
      .writer
      .add_array(format!("{id}/start_end_ids.npy"), &result.start_end_ids)?;
    state.num_candidates += result.num_candidates();
    debug!("写入图像 {}: {} 个候选", id, result.num_candidates());

    Ok(())
  }

  fn finish(self) -> Result<(), Self::Error> {
    let meta_path = self.meta_path();
    let state = self
      .state
      .into_inner()
      .map_err(|_| NpzRecordOutputError::Poisoned)?;

    let mut file = state.writer.finish()?;
    file.flush()?;

    let meta = RecordMeta {
      subset: &self.tag.subset,
      model_num: self.tag.model_num,
      num_images: state.written.len(),
      num_candidates: state.num_candidates,
      created_at: Utc::now().to_rfc3339(),
    };
    serde_json::to_writer_pretty(BufWriter::new(File::create(&meta_path)?), &meta)?;

    info!(
      "预测结果写入完成: {} ({} 张图像, {} 个候选)",
      self.path.display(),
      meta.num_images,
      meta.num_candidates
    );
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::sample::tests::tiny_sample;
  use ndarray::{Array2, array};
  use ndarray_npy::NpzReader;

  fn detections(sample: &HoiSample) -> HoiDetections {
    HoiDetections {
      global_id: sample.global_id.clone(),
      human_obj_boxes_scores: array![
        [0., 0., 10., 10., 5., 5., 20., 20., 0.54],
        [1., 1., 5., 5., 2., 2., 8., 8., 0.15]
      ],
      start_end_ids: sample.start_end_ids.clone(),
    }
  }

  #[test]
  fn writes_groups_and_meta() {
    let dir = tempfile::tempdir().unwrap();
    let url = Url::parse(&format!("npz://{}/exp", dir.path().display())).unwrap();
    let output = NpzRecordOutputBuilder::from_url(&url)
      .unwrap()
      .build(&RunTag::new("test", 7))
      .unwrap();
    let path = output.path().to_path_buf();
    let meta_path = output.meta_path();
    assert_eq!(path, dir.path().join("exp/pred_hoi_dets_test_7.npz"));

    let sample = tiny_sample();
    let dets = detections(&sample);
    output.render_result(&sample, &dets).unwrap();
    output.finish().unwrap();

    let mut reader = NpzReader::new(File::open(&path).unwrap()).unwrap();
    let boxes: Array2<f32> = reader
      .by_name(&format!("{}/human_obj_boxes_scores.npy", sample.global_id))
      .unwrap();
    assert_eq!(boxes, dets.human_obj_boxes_scores);
    let ranges: Array2<i64> = reader
      .by_name(&format!("{}/start_end_ids.npy", sample.global_id))
      .unwrap();
    assert_eq!(ranges, sample.start_end_ids);

    let meta: serde_json::Value =
      serde_json::from_str(&std::fs::read_to_string(meta_path).unwrap()).unwrap();
    assert_eq!(meta["subset"], "test");
    assert_eq!(meta["model_num"], 7);
    assert_eq!(meta["num_images"], 1);
    assert_eq!(meta["num_candidates"], 2);
  }

  #[test]
  fn rejects_duplicate_image() {
    let dir = tempfile::tempdir().unwrap();
    let output = NpzRecordOutputBuilder::new(dir.path().join("dup.npz"))
      .build(&RunTag::new("test", 0))
      .unwrap();
    let sample = tiny_sample();
    let dets = detections(&sample);
    output.render_result(&sample, &dets).unwrap();
    assert!(matches!(
      output.render_result(&sample, &dets),
      Err(NpzRecordOutputError::DuplicateGroup(_))
    ));
  }

  #[test]
  fn rejects_result_for_other_image() {
    let dir = tempfile::tempdir().unwrap();
    let output = NpzRecordOutputBuilder::new(dir.path())
      .build(&RunTag::new("test", 0))
      .unwrap();
    let sample = tiny_sample();
    let mut dets = detections(&sample);
    dets.global_id = "HICO_test2015_00000002".to_string();
    assert!(matches!(
      output.render_result(&sample, &dets),
      Err(NpzRecordOutputError::SampleMismatch(_, _))
    ));
  }
}
