// 该文件是 Guanxi （关系评估） 项目的一部分。
// src/model/evaluator.rs - 关系分类模型推理
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

use std::path::PathBuf;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use ndarray::Array2;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{
    HoiDetections, Model,
    config::{ConfigError, RelationModelConfig},
    gather_relation::{GatherRelation, GatherRelationError},
    relation_classifier::{RelationClassifier, RelationClassifierError, RelationFeatures},
    scoring::{self, BOXES_SCORES_COLS, ScoringError},
  },
  sample::HoiSample,
  utils::{query_value, url_path},
};

#[derive(Error, Debug)]
pub enum RelationModelError {
  #[error("模型加载错误: {0}")]
  ModelLoadError(candle_core::Error),
  #[error("模型配置错误: {0}")]
  ConfigError(#[from] ConfigError),
  #[error("HOI 映射错误: {0}")]
  GatherRelationError(#[from] GatherRelationError),
  #[error("关系分类器错误: {0}")]
  ClassifierError(#[from] RelationClassifierError),
  #[error("张量错误: {0}")]
  CandleError(#[from] candle_core::Error),
  #[error("得分计算错误: {0}")]
  ScoringError(#[from] ScoringError),
  #[error("数组形状错误: {0}")]
  ShapeError(#[from] ndarray::ShapeError),
  #[error("图像 {global_id} 的 {field} 维度为 {actual}, 模型期望 {expected}")]
  FeatureDimMismatch {
    global_id: String,
    field: &'static str,
    expected: usize,
    actual: usize,
  },
  #[error("框感知模型需要图像 {0} 的 box_feat")]
  MissingBoxFeatures(String),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("不支持的设备: {0}")]
  UnsupportedDevice(String),
}

const RELATION_SCHEME: &str = "relation";
const CONFIG_EXTENSION: &str = "json";

pub struct RelationEvaluatorBuilder {
  model_path: PathBuf,
  config_path: PathBuf,
  model_num: u64,
  device: String,
}

impl FromUrlWithScheme for RelationEvaluatorBuilder {
  const SCHEME: &'static str = RELATION_SCHEME;
}

impl FromUrl for RelationEvaluatorBuilder {
  type Error = RelationModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(RelationModelError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        RELATION_SCHEME
      )));
    }

    let model_path = url_path(url);
    let config_path = query_value(url, "config")
      .map(PathBuf::from)
      .unwrap_or_else(|| model_path.with_extension(CONFIG_EXTENSION));
    let model_num = match query_value(url, "model_num") {
      Some(v) => v.parse().map_err(|_| {
        RelationModelError::ModelPathError(format!("model_num 不是有效数字: {}", v))
      })?,
      None => 0,
    };

    Ok(RelationEvaluatorBuilder {
      model_path,
      config_path,
      model_num,
      device: query_value(url, "device").unwrap_or_else(|| "cpu".to_string()),
    })
  }
}

impl RelationEvaluatorBuilder {
  pub fn device(mut self, device: &str) -> Self {
    self.device = device.to_string();
    self
  }

  pub fn model_num(mut self, model_num: u64) -> Self {
    self.model_num = model_num;
    self
  }

  pub fn build(self) -> Result<RelationEvaluator, RelationModelError> {
    let device = parse_device(&self.device)?;
    info!("读取模型配置: {}", self.config_path.display());
    let config = RelationModelConfig::load(&self.config_path)?;

    info!("加载模型参数: {}", self.model_path.display());
    let tensors = candle_core::safetensors::load(&self.model_path, &device).map_err(|e| {
      error!("无法读取模型参数: {}", e);
      RelationModelError::ModelLoadError(e)
    })?;
    debug!("模型参数张量数量: {}", tensors.len());
    let vb = VarBuilder::from_tensors(tensors, DType::F32, &device);

    RelationEvaluator::new(config, vb, device, self.model_num)
  }
}

fn parse_device(device: &str) -> Result<Device, RelationModelError> {
  match device {
    "cpu" => Ok(Device::Cpu),
    "cuda" => Ok(Device::new_cuda(0)?),
    other => match other.strip_prefix("cuda:").map(str::parse::<usize>) {
      Some(Ok(ordinal)) => Ok(Device::new_cuda(ordinal)?),
      _ => Err(RelationModelError::UnsupportedDevice(other.to_string())),
    },
  }
}

/// 关系分类器 + HOI 映射 + 得分合成
pub struct RelationEvaluator {
  config: RelationModelConfig,
  classifier: RelationClassifier,
  gather: GatherRelation,
  device: Device,
  model_num: u64,
}

impl RelationEvaluator {
  pub fn new(
    config: RelationModelConfig,
    vb: VarBuilder,
    device: Device,
    model_num: u64,
  ) -> Result<Self, RelationModelError> {
    config.validate()?;

    let gather = match (
      &config.hoi_to_relation,
      &config.hoi_list_json,
      &config.verb_list_json,
    ) {
      (Some(ids), _, _) => GatherRelation::new(ids.clone(), config.num_relations, &device)?,
      (None, Some(hois), Some(verbs)) => {
        GatherRelation::from_json_files(hois, verbs, config.num_relations, &device)?
      }
      _ => {
        return Err(RelationModelError::ConfigError(ConfigError::Invalid(
          "缺少 HOI 映射".to_string(),
        )));
      }
    };

    let classifier =
      RelationClassifier::new(&config, vb).map_err(RelationModelError::ModelLoadError)?;
    info!(
      "模型加载完成: {} 个关系类别, {} 个 HOI 类别, 框感知: {}",
      config.num_relations,
      gather.num_hoi_classes(),
      classifier.is_box_aware()
    );

    Ok(RelationEvaluator {
      config,
      classifier,
      gather,
      device,
      model_num,
    })
  }

  pub fn model_num(&self) -> u64 {
    self.model_num
  }

  pub fn num_hoi_classes(&self) -> usize {
    self.gather.num_hoi_classes()
  }

  pub fn is_box_aware(&self) -> bool {
    self.classifier.is_box_aware()
  }

  fn check_dims(&self, sample: &HoiSample) -> Result<(), RelationModelError> {
    let mut dims = vec![
      (
        "human_feat",
        sample.human_feat.ncols(),
        self.config.human_feat_dim,
      ),
      (
        "object_feat",
        sample.object_feat.ncols(),
        self.config.object_feat_dim,
      ),
      (
        "hoi_prob_vec",
        sample.num_hoi_classes(),
        self.gather.num_hoi_classes(),
      ),
    ];
    if self.is_box_aware() {
      let Some(box_feat) = &sample.box_feat else {
        error!("框感知模型缺少图像 {} 的 box_feat", sample.global_id);
        return Err(RelationModelError::MissingBoxFeatures(
          sample.global_id.clone(),
        ));
      };
      dims.push(("box_feat", box_feat.ncols(), self.config.box_feat_dim));
    }

    for (field, actual, expected) in dims {
      if actual != expected {
        error!(
          "图像 {} 的 {} 维度为 {}, 模型期望 {}",
          sample.global_id, field, actual, expected
        );
        return Err(RelationModelError::FeatureDimMismatch {
          global_id: sample.global_id.clone(),
          field,
          expected,
          actual,
        });
      }
    }
    Ok(())
  }

  /// 关系分类器输出映射到 HOI 类别空间后的 (n, H) 概率
  pub fn relation_prob_vec(&self, sample: &HoiSample) -> Result<Array2<f32>, RelationModelError> {
    let human_rcnn = to_tensor(&sample.human_feat, &self.device)?;
    let object_rcnn = to_tensor(&sample.object_feat, &self.device)?;
    let box_feat = match &sample.box_feat {
      Some(feat) if self.is_box_aware() => Some(to_tensor(feat, &self.device)?),
      _ => None,
    };

    let relation_prob = self.classifier.forward(&RelationFeatures {
      human_rcnn: &human_rcnn,
      object_rcnn: &object_rcnn,
      box_feat: box_feat.as_ref(),
    })?;
    let relation_prob_vec = self.gather.forward(&relation_prob)?;
    from_tensor(&relation_prob_vec)
  }
}

impl Model for RelationEvaluator {
  type Input = HoiSample;
  type Output = HoiDetections;
  type Error = RelationModelError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    self.check_dims(input)?;

    if input.num_candidates() == 0 {
      debug!("图像 {} 没有候选, 跳过推理", input.global_id);
      return Ok(HoiDetections {
        global_id: input.global_id.clone(),
        human_obj_boxes_scores: Array2::zeros((0, BOXES_SCORES_COLS)),
        start_end_ids: input.start_end_ids.clone(),
      });
    }

    debug!("执行模型推理");
    let relation_prob_vec = self.relation_prob_vec(input)?;
    Self::postprocess(input, relation_prob_vec)
  }
}

impl RelationEvaluator {
  /// 合成 HOI 得分并拼接候选框
  pub fn postprocess(
    input: &HoiSample,
    relation_prob_vec: Array2<f32>,
  ) -> Result<HoiDetections, RelationModelError> {
    let hoi_prob = scoring::combine_hoi_prob(
      input.human_prob_vec.view(),
      input.object_prob_vec.view(),
      relation_prob_vec.view(),
    )?;
    let scores = scoring::select_scores(hoi_prob.view(), input.hoi_idx.view())?;
    let human_obj_boxes_scores = scoring::boxes_with_scores(
      input.human_box.view(),
      input.object_box.view(),
      scores.view(),
    )?;
    debug!(
      "图像 {}: {} 个候选得分",
      input.global_id,
      human_obj_boxes_scores.nrows()
    );

    Ok(HoiDetections {
      global_id: input.global_id.clone(),
      human_obj_boxes_scores,
      start_end_ids: input.start_end_ids.clone(),
    })
  }
}

fn to_tensor(array: &Array2<f32>, device: &Device) -> candle_core::Result<Tensor> {
  let (rows, cols) = array.dim();
  Tensor::from_vec(array.iter().copied().collect::<Vec<f32>>(), (rows, cols), device)
}

fn from_tensor(tensor: &Tensor) -> Result<Array2<f32>, RelationModelError> {
  let (rows, cols) = tensor.dims2()?;
  let data = tensor.flatten_all()?.to_vec1::<f32>()?;
  Ok(Array2::from_shape_vec((rows, cols), data)?)
}
