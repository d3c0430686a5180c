// 该文件是 Guanxi （关系评估） 项目的一部分。
// src/utils.rs - URL 解析辅助函数
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

use url::Url;

/// 取出 URL 中的文件路径（已解码百分号转义）
pub fn url_path(url: &Url) -> PathBuf {
  let raw = url.path();
  match urlencoding::decode(raw) {
    Ok(decoded) => PathBuf::from(decoded.into_owned()),
    Err(_) => PathBuf::from(raw),
  }
}

/// 查询参数中第一个名为 `key` 的值
pub fn query_value(url: &Url, key: &str) -> Option<String> {
  url
    .query_pairs()
    .find(|(k, _)| k == key)
    .map(|(_, v)| v.into_owned())
}

/// 布尔型查询参数，`key`、`key=1`、`key=true` 视为真
pub fn query_flag(url: &Url, key: &str) -> bool {
  match query_value(url, key) {
    Some(v) => v.is_empty() || v == "1" || v.eq_ignore_ascii_case("true"),
    None => false,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn decodes_percent_escaped_path() {
    let url = Url::parse("features:///data/hico%20det/feats.npz").unwrap();
    assert_eq!(url_path(&url), PathBuf::from("/data/hico det/feats.npz"));
  }

  #[test]
  fn reads_query_values_and_flags() {
    let url = Url::parse("features:///a.npz?subset=val&box&strict=0").unwrap();
    assert_eq!(query_value(&url, "subset").as_deref(), Some("val"));
    assert!(query_flag(&url, "box"));
    assert!(!query_flag(&url, "strict"));
    assert!(!query_flag(&url, "missing"));
  }
}
