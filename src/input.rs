// 该文件是 Guanxi （关系评估） 项目的一部分。
// src/input.rs - 样本输入
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

use thiserror::Error;

use crate::{FromUrl, sample::HoiSample};

#[cfg(feature = "features_input")]
mod features_file;
#[cfg(feature = "features_input")]
pub use self::features_file::{FeaturesFileInput, FeaturesFileSamples, FeaturesInputError};

#[derive(Error, Debug)]
pub enum InputError {
  #[cfg(feature = "features_input")]
  #[error("特征文件输入错误: {0}")]
  FeaturesInputError(#[from] FeaturesInputError),
  #[error("URI scheme mismatch")]
  SchemeMismatch,
}

pub enum InputWrapper {
  #[cfg(feature = "features_input")]
  FeaturesFile(FeaturesFileInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    #[cfg(feature = "features_input")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == FeaturesFileInput::SCHEME {
        let input = FeaturesFileInput::from_url(url)?;
        return Ok(InputWrapper::FeaturesFile(input));
      }
    }
    let _ = url;
    Err(InputError::SchemeMismatch)
  }
}

impl InputWrapper {
  /// 被评估的数据子集名称
  pub fn subset(&self) -> &str {
    match self {
      #[cfg(feature = "features_input")]
      InputWrapper::FeaturesFile(input) => input.subset(),
    }
  }

  pub fn len(&self) -> usize {
    match self {
      #[cfg(feature = "features_input")]
      InputWrapper::FeaturesFile(input) => input.len(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn into_samples(self) -> InputWrapperIter {
    match self {
      #[cfg(feature = "features_input")]
      InputWrapper::FeaturesFile(input) => InputWrapperIter::FeaturesFile(input.into_samples()),
    }
  }
}

pub enum InputWrapperIter {
  #[cfg(feature = "features_input")]
  FeaturesFile(FeaturesFileSamples),
}

impl Iterator for InputWrapperIter {
  type Item = Result<HoiSample, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      #[cfg(feature = "features_input")]
      InputWrapperIter::FeaturesFile(input) => input.next().map(|r| r.map_err(InputError::from)),
    }
  }
}
