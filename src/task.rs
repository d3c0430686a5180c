// 该文件是 Guanxi （关系评估） 项目的一部分。
// src/task.rs - 评估任务
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
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  time::{Duration, Instant},
};
use tracing::{debug, error, info, warn};

use crate::{
  model::{HoiDetections, Model},
  output::Render,
  sample::HoiSample,
};

pub trait Task<I, M, O>: Sized {
  type Error;
  type Summary;
  fn run_task(self, input: I, model: M, output: O) -> Result<Self::Summary, Self::Error>;
}

/// 一次评估的统计
#[derive(Debug, Clone, PartialEq)]
pub struct EvalSummary {
  pub images: usize,
  pub candidates: usize,
  pub elapsed: Duration,
  pub interrupted: bool,
}

/// 顺序遍历数据集，逐张推理并写出结果
#[derive(Debug)]
pub struct EvalTask {
  max_samples: Option<usize>,
  log_every: usize,
  stop: Arc<AtomicBool>,
}

impl Default for EvalTask {
  fn default() -> Self {
    EvalTask {
      max_samples: None,
      log_every: 100,
      stop: Arc::new(AtomicBool::new(false)),
    }
  }
}

impl EvalTask {
  pub fn with_max_samples(mut self, max_samples: Option<usize>) -> Self {
    self.max_samples = max_samples;
    self
  }

  pub fn with_log_every(mut self, log_every: usize) -> Self {
    self.log_every = log_every.max(1);
    self
  }

  /// 置位后任务在当前图像处理完后退出
  pub fn stop_flag(&self) -> Arc<AtomicBool> {
    self.stop.clone()
  }

  /// 收到 Ctrl-C 时停止任务
  pub fn with_ctrlc(self) -> Result<Self, ctrlc::Error> {
    let stop = self.stop_flag();
    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      stop.store(true, Ordering::SeqCst);
    })?;
    Ok(self)
  }
}

impl<IE, ME, RE, I, M, O> Task<I, M, O> for EvalTask
where
  IE: std::error::Error + Sync + Send + 'static,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Result<HoiSample, IE>>,
  M: Model<Input = HoiSample, Output = HoiDetections, Error = ME>,
  O: Render<HoiSample, HoiDetections, Error = RE>,
{
  type Error = anyhow::Error;
  type Summary = EvalSummary;

  fn run_task(self, input: I, model: M, output: O) -> Result<Self::Summary, Self::Error> {
    info!("开始评估...");
    let start = Instant::now();
    let mut images = 0usize;
    let mut candidates = 0usize;
    let mut interrupted = false;

    let outcome = (|| -> anyhow::Result<()> {
      for sample in input {
        if self.max_samples.map(|n| images >= n).unwrap_or(false) {
          info!("达到指定图像数 {}, 退出评估循环", images);
          break;
        }
        if self.stop.load(Ordering::SeqCst) {
          warn!("中断信号接收，退出评估循环");
          interrupted = true;
          break;
        }

        let sample = sample?;
        let now = Instant::now();
        let result = model.infer(&sample)?;
        output.render_result(&sample, &result)?;
        debug!(
          "图像 {} 完成: {} 个候选, 耗时 {:.2?}",
          sample.global_id,
          result.num_candidates(),
          now.elapsed()
        );

        images += 1;
        candidates += result.num_candidates();
        if images % self.log_every == 0 {
          info!(
            "已评估 {} 张图像, {} 个候选, 累计耗时 {:.2?}",
            images,
            candidates,
            start.elapsed()
          );
        }
      }
      Ok(())
    })();

    // 出错时也结束输出，已写入的图像保持可读
    let finished = output.finish();
    if let Err(e) = outcome {
      error!("评估在第 {} 张图像后失败: {}", images, e);
      if let Err(fe) = finished {
        error!("结束输出失败: {}", fe);
      }
      return Err(e);
    }
    finished?;

    let summary = EvalSummary {
      images,
      candidates,
      elapsed: start.elapsed(),
      interrupted,
    };
    info!(
      "评估完成: {} 张图像, {} 个候选, 耗时 {:.2?}",
      summary.images, summary.candidates, summary.elapsed
    );
    Ok(summary)
  }
}

/// 对第一张图像重复推理，统计平均耗时
#[derive(Debug)]
pub struct BenchmarkTask {
  repeat: usize,
  warmup: usize,
}

impl Default for BenchmarkTask {
  fn default() -> Self {
    BenchmarkTask {
      repeat: 100,
      warmup: 2,
    }
  }
}

impl BenchmarkTask {
  pub fn with_repeat(mut self, repeat: usize) -> Self {
    self.repeat = repeat;
    self
  }

  pub fn with_warmup(mut self, warmup: usize) -> Self {
    self.warmup = warmup;
    self
  }
}

impl<IE, ME, I, M> Task<I, M, ()> for BenchmarkTask
where
  IE: std::error::Error + Sync + Send + 'static,
  ME: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Result<HoiSample, IE>>,
  M: Model<Input = HoiSample, Output = HoiDetections, Error = ME>,
{
  type Error = anyhow::Error;
  type Summary = Duration;

  fn run_task(self, mut input: I, model: M, _output: ()) -> Result<Self::Summary, Self::Error> {
    if self.repeat <= self.warmup {
      anyhow::bail!(
        "重复次数 {} 必须大于预热次数 {}",
        self.repeat,
        self.warmup
      );
    }

    info!("开始基准测试...");
    let sample = input.next().ok_or_else(|| anyhow::anyhow!("没有输入样本"))??;
    info!(
      "输入样本 {} 获取成功 ({} 个候选)，开始推理...",
      sample.global_id,
      sample.num_candidates()
    );

    let mut times = Vec::with_capacity(self.repeat);
    for i in 0..self.repeat {
      let now = Instant::now();
      let result = model.infer(&sample)?;
      let elapsed = now.elapsed();
      debug!("({})推理完成，{} 个候选，耗时: {:.2?}", i, result.num_candidates(), elapsed);
      times.push(elapsed);
    }

    let measured = &times[self.warmup..];
    let mean = measured.iter().sum::<Duration>() / measured.len() as u32;
    warn!("平均推理时间: {:.2?}", mean);
    Ok(mean)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::sample::tests::tiny_sample;
  use ndarray::Array2;
  use std::sync::Mutex;
  use thiserror::Error;

  #[derive(Error, Debug)]
  #[error("mock error")]
  struct MockError;

  struct ConstModel;

  impl Model for ConstModel {
    type Input = HoiSample;
    type Output = HoiDetections;
    type Error = MockError;

    fn infer(&self, input: &HoiSample) -> Result<HoiDetections, MockError> {
      Ok(HoiDetections {
        global_id: input.global_id.clone(),
        human_obj_boxes_scores: Array2::zeros((input.num_candidates(), 9)),
        start_end_ids: input.start_end_ids.clone(),
      })
    }
  }

  #[derive(Default)]
  struct CollectOutput {
    ids: Arc<Mutex<Vec<String>>>,
    finished: Arc<AtomicBool>,
  }

  impl Render<HoiSample, HoiDetections> for CollectOutput {
    type Error = MockError;

    fn render_result(&self, _input: &HoiSample, result: &HoiDetections) -> Result<(), MockError> {
      self.ids.lock().unwrap().push(result.global_id.clone());
      Ok(())
    }

    fn finish(self) -> Result<(), MockError> {
      self.finished.store(true, Ordering::SeqCst);
      Ok(())
    }
  }

  fn samples(n: usize) -> Vec<Result<HoiSample, MockError>> {
    (0..n)
      .map(|i| {
        let mut s = tiny_sample();
        s.global_id = format!("img_{i}");
        Ok(s)
      })
      .collect()
  }

  #[test]
  fn evaluates_every_sample_once() {
    let output = CollectOutput::default();
    let (ids, finished) = (output.ids.clone(), output.finished.clone());
    let summary = EvalTask::default()
      .run_task(samples(3).into_iter(), ConstModel, output)
      .unwrap();

    assert_eq!(summary.images, 3);
    assert_eq!(summary.candidates, 6);
    assert!(!summary.interrupted);
    assert_eq!(*ids.lock().unwrap(), vec!["img_0", "img_1", "img_2"]);
    assert!(finished.load(Ordering::SeqCst));
  }

  #[test]
  fn honours_max_samples() {
    let output = CollectOutput::default();
    let ids = output.ids.clone();
    let summary = EvalTask::default()
      .with_max_samples(Some(2))
      .run_task(samples(5).into_iter(), ConstModel, output)
      .unwrap();
    assert_eq!(summary.images, 2);
    assert_eq!(ids.lock().unwrap().len(), 2);
  }

  #[test]
  fn stop_flag_still_finishes_output() {
    let output = CollectOutput::default();
    let finished = output.finished.clone();
    let task = EvalTask::default();
    task.stop_flag().store(true, Ordering::SeqCst);
    let summary = task
      .run_task(samples(3).into_iter(), ConstModel, output)
      .unwrap();
    assert!(summary.interrupted);
    assert_eq!(summary.images, 0);
    assert!(finished.load(Ordering::SeqCst));
  }

  #[test]
  fn input_error_aborts_task_but_finishes_output() {
    let mut input = samples(3);
    input.insert(2, Err(MockError));
    let output = CollectOutput::default();
    let (ids, finished) = (output.ids.clone(), output.finished.clone());
    let result = EvalTask::default().run_task(input.into_iter(), ConstModel, output);
    assert!(result.is_err());
    assert_eq!(*ids.lock().unwrap(), vec!["img_0", "img_1"]);
    assert!(finished.load(Ordering::SeqCst));
  }

  #[test]
  fn benchmark_needs_more_runs_than_warmup() {
    let task = BenchmarkTask::default().with_repeat(2).with_warmup(2);
    assert!(task.run_task(samples(1).into_iter(), ConstModel, ()).is_err());

    let mean = BenchmarkTask::default()
      .with_repeat(5)
      .run_task(samples(1).into_iter(), ConstModel, ())
      .unwrap();
    assert!(mean < Duration::from_secs(1));
  }
}
