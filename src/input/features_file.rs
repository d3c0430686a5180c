// 该文件是 Guanxi （关系评估） 项目的一部分。
// src/input/features_file.rs - 预计算区域特征文件输入
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
  collections::{BTreeSet, HashMap, HashSet},
  fs::File,
  io::BufReader,
  path::{Path, PathBuf},
};

use ndarray::{Array, Array1, Array2, Dimension};
use ndarray_npy::{NpzReader, ReadNpyError, ReadNpzError};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  sample::{HoiSample, SampleError},
  utils::{query_flag, query_value, url_path},
};

const DEFAULT_SUBSET: &str = "test";
const NPY_SUFFIX: &str = ".npy";

#[derive(Error, Debug)]
pub enum FeaturesInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("NPZ 读取错误: {0}")]
  NpzError(#[from] ReadNpzError),
  #[error("划分文件解析错误: {0}")]
  SplitError(#[from] serde_json::Error),
  #[error("图像 {0} 缺少字段 {1}")]
  MissingField(String, &'static str),
  #[error("划分文件中的图像 {0} 不在特征文件中")]
  UnknownImage(String),
  #[error("划分文件中的图像 {0} 重复出现")]
  DuplicateImage(String),
  #[error("图像 {0} 含有负的 HOI 类别索引 {1}")]
  NegativeHoiIndex(String, i64),
  #[error("样本无效: {0}")]
  InvalidSample(#[from] SampleError),
}

/// NPZ 格式的特征文件，每张图像的字段存放在 `{global_id}/{field}.npy`
pub struct FeaturesFileInput {
  reader: NpzReader<BufReader<File>>,
  /// global_id -> (字段名 -> 压缩包中的实际条目名)
  entries: HashMap<String, HashMap<String, String>>,
  order: Vec<String>,
  subset: String,
  box_aware: bool,
}

impl FromUrlWithScheme for FeaturesFileInput {
  const SCHEME: &'static str = "features";
}

impl FromUrl for FeaturesFileInput {
  type Error = FeaturesInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(FeaturesInputError::SchemeMismatch);
    }

    let subset = query_value(url, "subset").unwrap_or_else(|| DEFAULT_SUBSET.to_string());
    let split = query_value(url, "split").map(PathBuf::from);
    Self::open(url_path(url), subset, split.as_deref(), query_flag(url, "box"))
  }
}

impl FeaturesFileInput {
  pub fn open(
    path: impl AsRef<Path>,
    subset: String,
    split: Option<&Path>,
    box_aware: bool,
  ) -> Result<Self, FeaturesInputError> {
    let path = path.as_ref();
    info!("打开特征文件: {}", path.display());
    let mut reader = NpzReader::new(BufReader::new(File::open(path)?))?;

    let mut entries: HashMap<String, HashMap<String, String>> = HashMap::new();
    for name in reader.names()? {
      let stem = name.strip_suffix(NPY_SUFFIX).unwrap_or(&name);
      // 数组名中最后一个 '/' 之后是字段名，之前是 global_id
      let Some((global_id, field)) = stem.rsplit_once('/') else {
        debug!("跳过不属于任何图像的条目: {}", name);
        continue;
      };
      entries
        .entry(global_id.to_string())
        .or_default()
        .insert(field.to_string(), name.clone());
    }

    let order = match split {
      Some(split) => {
        info!("读取划分文件: {}", split.display());
        let ids: Vec<String> = serde_json::from_reader(BufReader::new(File::open(split)?))?;
        if let Some(missing) = ids.iter().find(|id| !entries.contains_key(*id)) {
          error!("划分文件中的图像 {} 不在特征文件中", missing);
          return Err(FeaturesInputError::UnknownImage(missing.clone()));
        }
        let duplicate = {
          let mut seen = HashSet::with_capacity(ids.len());
          ids.iter().find(|id| !seen.insert(id.as_str())).cloned()
        };
        if let Some(duplicate) = duplicate {
          error!("划分文件中的图像 {} 重复出现", duplicate);
          return Err(FeaturesInputError::DuplicateImage(duplicate));
        }
        ids
      }
      None => entries
        .keys()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect(),
    };

    info!(
      "特征文件包含 {} 张图像, 子集 {} 将评估 {} 张",
      entries.len(),
      subset,
      order.len()
    );

    Ok(FeaturesFileInput {
      reader,
      entries,
      order,
      subset,
      box_aware,
    })
  }

  pub fn subset(&self) -> &str {
    &self.subset
  }

  pub fn box_aware(&self) -> bool {
    self.box_aware
  }

  pub fn len(&self) -> usize {
    self.order.len()
  }

  pub fn is_empty(&self) -> bool {
    self.order.is_empty()
  }

  /// 按评估顺序逐张读取
  pub fn into_samples(self) -> FeaturesFileSamples {
    FeaturesFileSamples {
      inner: self,
      cursor: 0,
    }
  }

  fn entry_name(&self, global_id: &str, field: &'static str) -> Option<String> {
    self
      .entries
      .get(global_id)
      .and_then(|fields| fields.get(field))
      .cloned()
  }

  /// 读取 f32 数组，f64 数组按 f32 截断
  fn read_f32(&mut self, name: &str) -> Result<Array2<f32>, ReadNpzError> {
    let narrow: Result<Array2<f32>, ReadNpzError> = self.reader.by_name(name);
    match narrow {
      Err(ReadNpzError::Npy(ReadNpyError::WrongDescriptor(_))) => {
        let wide: Array2<f64> = self.reader.by_name(name)?;
        debug!("{} 为 f64 数组, 转换为 f32", name);
        Ok(wide.mapv(|v| v as f32))
      }
      other => other,
    }
  }

  /// 读取 i64 数组，i32 数组按 i64 扩展
  fn read_i64<D: Dimension>(&mut self, name: &str) -> Result<Array<i64, D>, ReadNpzError> {
    let wide: Result<Array<i64, D>, ReadNpzError> = self.reader.by_name(name);
    match wide {
      Err(ReadNpzError::Npy(ReadNpyError::WrongDescriptor(_))) => {
        let narrow: Array<i32, D> = self.reader.by_name(name)?;
        debug!("{} 为 i32 数组, 转换为 i64", name);
        Ok(narrow.mapv(i64::from))
      }
      other => other,
    }
  }

  fn required_name(
    &self,
    global_id: &str,
    field: &'static str,
  ) -> Result<String, FeaturesInputError> {
    self
      .entry_name(global_id, field)
      .ok_or_else(|| FeaturesInputError::MissingField(global_id.to_string(), field))
  }

  fn required_f32(
    &mut self,
    global_id: &str,
    field: &'static str,
  ) -> Result<Array2<f32>, FeaturesInputError> {
    let name = self.required_name(global_id, field)?;
    Ok(self.read_f32(&name)?)
  }

  fn required_i64<D: Dimension>(
    &mut self,
    global_id: &str,
    field: &'static str,
  ) -> Result<Array<i64, D>, FeaturesInputError> {
    let name = self.required_name(global_id, field)?;
    Ok(self.read_i64(&name)?)
  }

  pub fn load(&mut self, global_id: &str) -> Result<HoiSample, FeaturesInputError> {
    if !self.entries.contains_key(global_id) {
      return Err(FeaturesInputError::UnknownImage(global_id.to_string()));
    }

    let human_feat = self.required_f32(global_id, "human_feat")?;
    let object_feat = self.required_f32(global_id, "object_feat")?;
    let box_feat: Option<Array2<f32>> = match self.entry_name(global_id, "box_feat") {
      Some(name) => Some(self.read_f32(&name)?),
      None if self.box_aware => {
        return Err(FeaturesInputError::MissingField(
          global_id.to_string(),
          "box_feat",
        ));
      }
      None => None,
    };
    let human_prob_vec = self.required_f32(global_id, "human_prob_vec")?;
    let object_prob_vec = self.required_f32(global_id, "object_prob_vec")?;
    let raw_hoi_idx: Array1<i64> = self.required_i64(global_id, "hoi_idx")?;
    let human_box = self.required_f32(global_id, "human_box")?;
    let object_box = self.required_f32(global_id, "object_box")?;
    let start_end_ids: Array2<i64> = self.required_i64(global_id, "start_end_ids")?;

    if let Some(&negative) = raw_hoi_idx.iter().find(|idx| **idx < 0) {
      return Err(FeaturesInputError::NegativeHoiIndex(
        global_id.to_string(),
        negative,
      ));
    }
    let hoi_idx = raw_hoi_idx.mapv(|idx| idx as usize);

    let sample = HoiSample {
      global_id: global_id.to_string(),
      human_feat,
      object_feat,
      box_feat,
      human_prob_vec,
      object_prob_vec,
      hoi_idx,
      human_box,
      object_box,
      start_end_ids,
    };
    sample.validate()?;

    debug!(
      "读取图像 {}: {} 个候选, {} 个 HOI 类别",
      sample.global_id,
      sample.num_candidates(),
      sample.num_hoi_classes()
    );
    Ok(sample)
  }
}

pub struct FeaturesFileSamples {
  inner: FeaturesFileInput,
  cursor: usize,
}

impl FeaturesFileSamples {
  pub fn subset(&self) -> &str {
    self.inner.subset()
  }
}

impl Iterator for FeaturesFileSamples {
  type Item = Result<HoiSample, FeaturesInputError>;

  fn next(&mut self) -> Option<Self::Item> {
    let global_id = self.inner.order.get(self.cursor)?.clone();
    self.cursor += 1;
    Some(self.inner.load(&global_id))
  }

  fn size_hint(&self) -> (usize, Option<usize>) {
    let remaining = self.inner.order.len() - self.cursor;
    (remaining, Some(remaining))
  }
}
