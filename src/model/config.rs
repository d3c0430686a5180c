// 该文件是 Guanxi （关系评估） 项目的一部分。
// src/model/config.rs - 关系分类模型配置
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
  fs::File,
  io::BufReader,
  path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 解析错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("配置无效: {0}")]
  Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationModelConfig {
  /// 是否使用框几何特征分支
  #[serde(default)]
  pub box_aware: bool,
  pub human_feat_dim: usize,
  pub object_feat_dim: usize,
  #[serde(default)]
  pub box_feat_dim: usize,
  pub hidden_dim: usize,
  /// 关系（动词）类别数
  pub num_relations: usize,
  /// 每个 HOI 类别对应的关系索引，与 `hoi_list_json` 二选一
  #[serde(default)]
  pub hoi_to_relation: Option<Vec<usize>>,
  #[serde(default)]
  pub hoi_list_json: Option<PathBuf>,
  #[serde(default)]
  pub verb_list_json: Option<PathBuf>,
}

impl RelationModelConfig {
  /// 读取配置，HOI/动词列表的相对路径以配置文件所在目录为基准
  pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    debug!("读取模型配置: {}", path.display());
    let mut config: Self = serde_json::from_reader(BufReader::new(File::open(path)?))?;

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    for list in [&mut config.hoi_list_json, &mut config.verb_list_json] {
      if let Some(p) = list.as_mut() {
        if p.is_relative() {
          *p = base.join(&*p);
        }
      }
    }

    config.validate()?;
    Ok(config)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.human_feat_dim == 0 || self.object_feat_dim == 0 {
      return Err(ConfigError::Invalid("特征维度不能为 0".to_string()));
    }
    if self.hidden_dim == 0 || self.num_relations == 0 {
      return Err(ConfigError::Invalid("隐藏层维度与关系类别数不能为 0".to_string()));
    }
    if self.box_aware && self.box_feat_dim == 0 {
      return Err(ConfigError::Invalid(
        "box_aware 模型需要指定 box_feat_dim".to_string(),
      ));
    }
    let has_lists = self.hoi_list_json.is_some() && self.verb_list_json.is_some();
    if self.hoi_to_relation.is_none() && !has_lists {
      return Err(ConfigError::Invalid(
        "需要 hoi_to_relation 或 hoi_list_json + verb_list_json".to_string(),
      ));
    }
    Ok(())
  }
}

/// HICO 风格 `hoi_list.json` 中的一项
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoiEntry {
  pub id: String,
  pub object: String,
  pub verb: String,
}

/// HICO 风格 `verb_list.json` 中的一项
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerbEntry {
  pub id: String,
  pub name: String,
}

pub fn load_json_list<T: for<'de> Deserialize<'de>>(
  path: impl AsRef<Path>,
) -> Result<Vec<T>, ConfigError> {
  let path = path.as_ref();
  debug!("读取列表文件: {}", path.display());
  Ok(serde_json::from_reader(BufReader::new(File::open(path)?))?)
}
