// 该文件是 Guanxi （关系评估） 项目的一部分。
// src/output.rs - 输出定义
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

use std::path::{Path, PathBuf};

use thiserror::Error;
use url::Url;

use crate::{model::HoiDetections, sample::HoiSample};

pub trait Render<Input, Output>: Sized {
  type Error;
  fn render_result(&self, input: &Input, result: &Output) -> Result<(), Self::Error>;

  /// 结束输出，写入所有缓冲内容
  fn finish(self) -> Result<(), Self::Error> {
    Ok(())
  }
}

/// 一次评估运行的标识，用于生成输出文件名
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunTag {
  pub subset: String,
  pub model_num: u64,
}

impl RunTag {
  pub fn new(subset: impl Into<String>, model_num: u64) -> Self {
    RunTag {
      subset: subset.into(),
      model_num,
    }
  }

  pub fn file_stem(&self) -> String {
    format!("pred_hoi_dets_{}_{}", self.subset, self.model_num)
  }

  /// `path` 以 `.{extension}` 结尾时直接使用，否则视为目录
  pub fn resolve(&self, path: &Path, extension: &str) -> PathBuf {
    match path.extension() {
      Some(ext) if ext == extension => path.to_path_buf(),
      _ => path.join(format!("{}.{}", self.file_stem(), extension)),
    }
  }
}

fn ensure_parent(path: &Path) -> std::io::Result<()> {
  if let Some(parent) = path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)?;
  }
  Ok(())
}

#[cfg(feature = "npz_record")]
mod npz_record;
#[cfg(feature = "npz_record")]
pub use self::npz_record::{NpzRecordOutput, NpzRecordOutputBuilder, NpzRecordOutputError};

#[cfg(feature = "json_lines")]
mod json_lines;
#[cfg(feature = "json_lines")]
pub use self::json_lines::{JsonLinesOutput, JsonLinesOutputBuilder, JsonLinesOutputError};

#[derive(Error, Debug)]
pub enum OutputError {
  #[cfg(feature = "npz_record")]
  #[error("NPZ 记录输出错误: {0}")]
  NpzRecordOutputError(#[from] NpzRecordOutputError),
  #[cfg(feature = "json_lines")]
  #[error("JSON 行输出错误: {0}")]
  JsonLinesOutputError(#[from] JsonLinesOutputError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

pub enum OutputWrapper {
  #[cfg(feature = "npz_record")]
  NpzRecordOutput(NpzRecordOutput),
  #[cfg(feature = "json_lines")]
  JsonLinesOutput(JsonLinesOutput),
}

impl OutputWrapper {
  pub fn open(url: &Url, tag: &RunTag) -> Result<Self, OutputError> {
    #[cfg(any(feature = "npz_record", feature = "json_lines"))]
    use crate::{FromUrl, FromUrlWithScheme};

    match url.scheme() {
      #[cfg(feature = "npz_record")]
      scheme if scheme == NpzRecordOutputBuilder::SCHEME => {
        let output = NpzRecordOutputBuilder::from_url(url)?.build(tag)?;
        Ok(OutputWrapper::NpzRecordOutput(output))
      }
      #[cfg(feature = "json_lines")]
      scheme if scheme == JsonLinesOutputBuilder::SCHEME => {
        let output = JsonLinesOutputBuilder::from_url(url)?.build(tag)?;
        Ok(OutputWrapper::JsonLinesOutput(output))
      }
      _ => {
        let _ = tag;
        Err(OutputError::SchemeMismatch)
      }
    }
  }

  pub fn path(&self) -> &Path {
    match self {
      #[cfg(feature = "npz_record")]
      OutputWrapper::NpzRecordOutput(output) => output.path(),
      #[cfg(feature = "json_lines")]
      OutputWrapper::JsonLinesOutput(output) => output.path(),
    }
  }
}

impl Render<HoiSample, HoiDetections> for OutputWrapper {
  type Error = OutputError;

  fn render_result(&self, input: &HoiSample, result: &HoiDetections) -> Result<(), Self::Error> {
    match self {
      #[cfg(feature = "npz_record")]
      OutputWrapper::NpzRecordOutput(output) => output
        .render_result(input, result)
        .map_err(OutputError::from),
      #[cfg(feature = "json_lines")]
      OutputWrapper::JsonLinesOutput(output) => output
        .render_result(input, result)
        .map_err(OutputError::from),
    }
  }

  fn finish(self) -> Result<(), Self::Error> {
    match self {
      #[cfg(feature = "npz_record")]
      OutputWrapper::NpzRecordOutput(output) => output.finish().map_err(OutputError::from),
      #[cfg(feature = "json_lines")]
      OutputWrapper::JsonLinesOutput(output) => output.finish().map_err(OutputError::from),
    }
  }
}
