// 该文件是 Guanxi （关系评估） 项目的一部分。
// src/model/gather_relation.rs - 关系概率到 HOI 类别概率的映射
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

use std::{collections::HashMap, path::Path};

use candle_core::{Device, Tensor};
use thiserror::Error;
use tracing::debug;

use crate::model::config::{ConfigError, HoiEntry, VerbEntry, load_json_list};

#[derive(Error, Debug)]
pub enum GatherRelationError {
  #[error("HOI 映射为空")]
  Empty,
  #[error("HOI 类别 {hoi} 映射到关系 {relation}, 超出关系类别数 {num_relations}")]
  RelationOutOfRange {
    hoi: usize,
    relation: usize,
    num_relations: usize,
  },
  #[error("HOI {0} 的动词 {1} 不在动词列表中")]
  UnknownVerb(String, String),
  #[error("动词列表长度 {0} 与关系类别数 {1} 不一致")]
  VerbCountMismatch(usize, usize),
  #[error("配置错误: {0}")]
  ConfigError(#[from] ConfigError),
  #[error("张量错误: {0}")]
  CandleError(#[from] candle_core::Error),
}

/// 按 HOI 类别从关系概率中取列
pub struct GatherRelation {
  relation_ids: Vec<usize>,
  index: Tensor,
  num_relations: usize,
}

impl GatherRelation {
  pub fn new(
    hoi_to_relation: Vec<usize>,
    num_relations: usize,
    device: &Device,
  ) -> Result<Self, GatherRelationError> {
    if hoi_to_relation.is_empty() {
      return Err(GatherRelationError::Empty);
    }
    if let Some((hoi, &relation)) = hoi_to_relation
      .iter()
      .enumerate()
      .find(|(_, r)| **r >= num_relations)
    {
      return Err(GatherRelationError::RelationOutOfRange {
        hoi,
        relation,
        num_relations,
      });
    }

    let ids: Vec<u32> = hoi_to_relation.iter().map(|&r| r as u32).collect();
    let index = Tensor::from_vec(ids, hoi_to_relation.len(), device)?;
    debug!(
      "GatherRelation: {} 个 HOI 类别, {} 个关系类别",
      hoi_to_relation.len(),
      num_relations
    );

    Ok(GatherRelation {
      relation_ids: hoi_to_relation,
      index,
      num_relations,
    })
  }

  /// 关系索引取动词名在动词列表中的位置
  pub fn from_lists(
    hois: &[HoiEntry],
    verbs: &[VerbEntry],
    num_relations: usize,
    device: &Device,
  ) -> Result<Self, GatherRelationError> {
    if verbs.len() != num_relations {
      return Err(GatherRelationError::VerbCountMismatch(
        verbs.len(),
        num_relations,
      ));
    }

    let verb_to_id: HashMap<&str, usize> = verbs
      .iter()
      .enumerate()
      .map(|(i, v)| (v.name.as_str(), i))
      .collect();

    let hoi_to_relation = hois
      .iter()
      .map(|hoi| {
        verb_to_id
          .get(hoi.verb.as_str())
          .copied()
          .ok_or_else(|| GatherRelationError::UnknownVerb(hoi.id.clone(), hoi.verb.clone()))
      })
      .collect::<Result<Vec<_>, _>>()?;

    Self::new(hoi_to_relation, num_relations, device)
  }

  pub fn from_json_files(
    hoi_list: impl AsRef<Path>,
    verb_list: impl AsRef<Path>,
    num_relations: usize,
    device: &Device,
  ) -> Result<Self, GatherRelationError> {
    let hois: Vec<HoiEntry> = load_json_list(hoi_list)?;
    let verbs: Vec<VerbEntry> = load_json_list(verb_list)?;
    Self::from_lists(&hois, &verbs, num_relations, device)
  }

  pub fn num_hoi_classes(&self) -> usize {
    self.relation_ids.len()
  }

  pub fn num_relations(&self) -> usize {
    self.num_relations
  }

  pub fn relation_ids(&self) -> &[usize] {
    &self.relation_ids
  }

  /// (n, R) -> (n, H)
  pub fn forward(&self, relation_prob: &Tensor) -> candle_core::Result<Tensor> {
    relation_prob.index_select(&self.index, 1)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn hoi(id: &str, object: &str, verb: &str) -> HoiEntry {
    HoiEntry {
      id: id.to_string(),
      object: object.to_string(),
      verb: verb.to_string(),
    }
  }

  fn verb(id: &str, name: &str) -> VerbEntry {
    VerbEntry {
      id: id.to_string(),
      name: name.to_string(),
    }
  }

  #[test]
  fn gathers_relation_columns_per_hoi() {
    let gather = GatherRelation::new(vec![1, 0, 1], 2, &Device::Cpu).unwrap();
    let relation = Tensor::new(&[[0.1f32, 0.9], [0.3, 0.7]], &Device::Cpu).unwrap();
    let out = gather.forward(&relation).unwrap().to_vec2::<f32>().unwrap();
    assert_eq!(out, vec![vec![0.9, 0.1, 0.9], vec![0.7, 0.3, 0.7]]);
  }

  #[test]
  fn builds_from_hico_style_lists() {
    let verbs = [verb("001", "board"), verb("002", "ride")];
    let hois = [
      hoi("001", "airplane", "board"),
      hoi("002", "bicycle", "ride"),
      hoi("003", "horse", "ride"),
    ];
    let gather = GatherRelation::from_lists(&hois, &verbs, 2, &Device::Cpu).unwrap();
    assert_eq!(gather.relation_ids(), &[0, 1, 1]);
    assert_eq!(gather.num_hoi_classes(), 3);
    assert_eq!(gather.num_relations(), 2);
  }

  #[test]
  fn rejects_unknown_verb() {
    let verbs = [verb("001", "board")];
    let hois = [hoi("004", "horse", "feed")];
    assert!(matches!(
      GatherRelation::from_lists(&hois, &verbs, 1, &Device::Cpu),
      Err(GatherRelationError::UnknownVerb(id, v)) if id == "004" && v == "feed"
    ));
  }

  #[test]
  fn rejects_relation_out_of_range() {
    assert!(matches!(
      GatherRelation::new(vec![0, 2], 2, &Device::Cpu),
      Err(GatherRelationError::RelationOutOfRange { hoi: 1, relation: 2, .. })
    ));
    assert!(matches!(
      GatherRelation::new(vec![], 2, &Device::Cpu),
      Err(GatherRelationError::Empty)
    ));
  }
}
