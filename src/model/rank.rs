// 该文件是 Maogou （猫狗识别） 项目的一部分。
// src/model/rank.rs - 置信度排序与 Top-K 选择
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

use std::{cmp::Ordering, collections::BinaryHeap};

use crate::{label::LabelTable, model::Recognition};

/// 以置信度为键的堆元素
struct Ranked {
  index: usize,
  confidence: f32,
}

impl PartialEq for Ranked {
  fn eq(&self, other: &Self) -> bool {
    self.cmp(other) == Ordering::Equal
  }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for Ranked {
  fn cmp(&self, other: &Self) -> Ordering {
    self.confidence.total_cmp(&other.confidence)
  }
}

/// 选出置信度严格大于 `threshold` 的前 `max_results` 个结果，按置信度降序
///
/// 同分结果的先后顺序不作保证。
pub fn select_top(
  confidences: &[f32],
  labels: &LabelTable,
  threshold: f32,
  max_results: usize,
) -> Vec<Recognition> {
  let mut heap: BinaryHeap<Ranked> = confidences
    .iter()
    .enumerate()
    .filter(|&(_, &confidence)| confidence > threshold)
    .map(|(index, &confidence)| Ranked { index, confidence })
    .collect();

  let mut results = Vec::with_capacity(max_results.min(heap.len()));
  while results.len() < max_results {
    let Some(Ranked { index, confidence }) = heap.pop() else {
      break;
    };
    results.push(Recognition::new(
      index.to_string(),
      labels.label_or_unknown(index),
      confidence,
    ));
  }
  results
}
