// src/report.rs

use crate::{
    models::{DownloadResult, ItemWarning},
    pipeline::RunOutcome,
    symbols, ui,
};
use colored::*;
use log::info;
use std::{collections::BTreeMap, path::PathBuf};

/// 失败原因通常很长 (带有下载程序的输出)，分组时只取最有信息量的一行
fn short_reason(reason: &str) -> String {
    let lines: Vec<&str> = reason.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    lines
        .iter()
        .rev()
        .find(|l| l.starts_with("ERROR"))
        .or_else(|| lines.first())
        .map_or_else(|| "未知原因".to_string(), |l| l.to_string())
}

fn failure_reason(result: &DownloadResult) -> Option<String> {
    result.warnings.iter().find_map(|w| match w {
        ItemWarning::Failed(reason) => Some(short_reason(reason)),
        _ => None,
    })
}

#[derive(Debug, Default, PartialEq)]
pub struct RunReport {
    pub title: String,
    pub total: usize,
    pub downloaded: Vec<(String, Vec<PathBuf>)>,
    pub skipped: Vec<String>,
    pub failed: Vec<(String, String)>,
    pub cancelled: bool,
}

impl RunReport {
    pub fn from_outcome(outcome: &RunOutcome) -> Self {
        let mut report = Self {
            title: outcome.title.clone(),
            total: outcome.total,
            cancelled: outcome.cancelled,
            ..Default::default()
        };
        for result in &outcome.results {
            if let Some(reason) = failure_reason(result) {
                report.failed.push((result.display_title(), reason));
            } else if result.is_already_downloaded() {
                report.skipped.push(result.display_title());
            } else {
                report.downloaded.push((result.display_title(), result.files.clone()));
            }
        }
        report
    }

    /// 原因 -> 条目标题，原因和标题都按字母序
    pub fn grouped_failures(&self) -> BTreeMap<&str, Vec<&str>> {
        let mut grouped: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (title, reason) in &self.failed {
            grouped.entry(reason.as_str()).or_default().push(title.as_str());
        }
        for titles in grouped.values_mut() {
            titles.sort();
        }
        grouped
    }

    /// 未处理的条目数 (取消后剩余的部分)
    pub fn unprocessed(&self) -> usize {
        self.total
            .saturating_sub(self.downloaded.len() + self.skipped.len() + self.failed.len())
    }

    pub fn print(&self) {
        info!(
            "运行报告 '{}': Total={}, Downloaded={}, Skipped={}, Failed={}, Cancelled={}",
            self.title,
            self.total,
            self.downloaded.len(),
            self.skipped.len(),
            self.failed.len(),
            self.cancelled
        );

        ui::print_sub_header(&format!("下载报告 - {}", self.title));
        if !self.downloaded.is_empty() {
            println!("\n{} 已下载 ({}个):", *symbols::OK, self.downloaded.len());
            for (title, files) in &self.downloaded {
                if files.is_empty() {
                    println!("  - {}", title);
                }
                for file in files {
                    println!("  - {}", file.display().to_string().green());
                }
            }
        }
        if !self.skipped.is_empty() {
            println!("\n{} 已下载过，跳过 ({}个):", *symbols::SKIP, self.skipped.len());
            for title in &self.skipped {
                println!("  - {}", title.cyan());
            }
        }
        if !self.failed.is_empty() {
            println!("\n{} 失败 ({}个):", *symbols::ERROR, self.failed.len());
            for (reason, titles) in self.grouped_failures() {
                println!("  - {}", format!("原因: {}", reason).red());
                for title in titles {
                    println!("    - {}", title);
                }
            }
        }
        if self.cancelled {
            println!(
                "\n{} 运行已被取消，{} 个条目未处理。",
                *symbols::WARN,
                self.unprocessed()
            );
        }

        let summary = format!(
            "{} | {} | {} | 总计: {}",
            format!("下载: {}", self.downloaded.len()).green(),
            format!("跳过: {}", self.skipped.len()).yellow(),
            format!("失败: {}", self.failed.len()).red(),
            self.total
        );
        println!("\n{}", summary);
    }
}
