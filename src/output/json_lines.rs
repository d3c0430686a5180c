// 该文件是 Guanxi （关系评估） 项目的一部分。
// src/output/json_lines.rs - 逐图像 JSON 行输出
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

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::HoiDetections,
  output::{Render, RunTag, ensure_parent},
  sample::HoiSample,
  utils::url_path,
};

const JSONL_EXTENSION: &str = "jsonl";

#[derive(Error, Debug)]
pub enum JsonLinesOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("图像 {0} 已写入过")]
  DuplicateGroup(String),
  #[error("记录状态锁已损坏")]
  Poisoned,
}

/// JSON 行中的一条记录
#[derive(Debug, Serialize, Deserialize)]
pub struct HoiRecord {
  pub global_id: String,
  pub num_candidates: usize,
  pub human_obj_boxes_scores: Vec<Vec<f32>>,
  pub start_end_ids: Vec<[i64; 2]>,
}

impl From<&HoiDetections> for HoiRecord {
  fn from(dets: &HoiDetections) -> Self {
    HoiRecord {
      global_id: dets.global_id.clone(),
      num_candidates: dets.num_candidates(),
      human_obj_boxes_scores: dets
        .human_obj_boxes_scores
        .outer_iter()
        .map(|row| row.to_vec())
        .collect(),
      start_end_ids: dets
        .start_end_ids
        .outer_iter()
        .map(|row| [row[0], row[1]])
        .collect(),
    }
  }
}

pub struct JsonLinesOutputBuilder {
  path: PathBuf,
}

impl FromUrlWithScheme for JsonLinesOutputBuilder {
  const SCHEME: &'static str = "jsonl";
}

impl FromUrl for JsonLinesOutputBuilder {
  type Error = JsonLinesOutputError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(JsonLinesOutputError::SchemeMismatch);
    }

    Ok(JsonLinesOutputBuilder {
      path: url_path(uri),
    })
  }
}

impl JsonLinesOutputBuilder {
  pub fn build(self, tag: &RunTag) -> Result<JsonLinesOutput, JsonLinesOutputError> {
    let path = tag.resolve(&self.path, JSONL_EXTENSION);
    ensure_parent(&path)?;
    info!("创建 JSON 行输出: {}", path.display());

    Ok(JsonLinesOutput {
      state: Mutex::new(JsonLinesState {
        writer: BufWriter::new(File::create(&path)?),
        written: HashSet::new(),
      }),
      path,
    })
  }
}

struct JsonLinesState {
  writer: BufWriter<File>,
  written: HashSet<String>,
}

pub struct JsonLinesOutput {
  path: PathBuf,
  state: Mutex<JsonLinesState>,
}

impl JsonLinesOutput {
  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl Render<HoiSample, HoiDetections> for JsonLinesOutput {
  type Error = JsonLinesOutputError;

  fn render_result(&self, _input: &HoiSample, result: &HoiDetections) -> Result<(), Self::Error> {
    let mut state = self
      .state
      .lock()
      .map_err(|_| JsonLinesOutputError::Poisoned)?;
    if !state.written.insert(result.global_id.clone()) {
      error!("图像 {} 已写入过", result.global_id);
      return Err(JsonLinesOutputError::DuplicateGroup(
        result.global_id.clone(),
      ));
    }

    serde_json::to_writer(&mut state.writer, &HoiRecord::from(result))?;
    state.writer.write_all(b"\n")?;
    Ok(())
  }

  fn finish(self) -> Result<(), Self::Error> {
    let mut state = self
      .state
      .into_inner()
      .map_err(|_| JsonLinesOutputError::Poisoned)?;
    state.writer.flush()?;
    info!(
      "JSON 行输出完成: {} ({} 张图像)",
      self.path.display(),
      state.written.len()
    );
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::sample::tests::tiny_sample;
  use ndarray::array;

  #[test]
  fn writes_one_line_per_image() {
    let dir = tempfile::tempdir().unwrap();
    let url = Url::parse(&format!("jsonl://{}/out.jsonl", dir.path().display())).unwrap();
    let output = JsonLinesOutputBuilder::from_url(&url)
      .unwrap()
      .build(&RunTag::new("test", 1))
      .unwrap();
    let path = output.path().to_path_buf();

    let sample = tiny_sample();
    let dets = HoiDetections {
      global_id: sample.global_id.clone(),
      human_obj_boxes_scores: array![[0., 0., 10., 10., 5., 5., 20., 20., 0.5]],
      start_end_ids: array![[0, 1]],
    };
    output.render_result(&sample, &dets).unwrap();
    assert!(matches!(
      output.render_result(&sample, &dets),
      Err(JsonLinesOutputError::DuplicateGroup(_))
    ));
    output.finish().unwrap();

    let text = std::fs::read_to_string(path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 1);
    let record: HoiRecord = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(record.global_id, sample.global_id);
    assert_eq!(record.num_candidates, 1);
    assert_eq!(record.human_obj_boxes_scores[0][8], 0.5);
    assert_eq!(record.start_end_ids, vec![[0, 1]]);
  }
}
