// ==========================================
// 批量物料导入系统 - CSV 读取器
// ==========================================
// 阶段 0: 字节流 → 表头 + 惰性数据行
// 支持: BOM / 引号内分隔符与换行 / 逗号或分号分隔
// ==========================================

use crate::domain::import::{RawRow, RowError, RowErrorReason};
use crate::importer::error::ImportError;
use csv::{ReaderBuilder, StringRecordsIntoIter, Trim};
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, instrument};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

// ==========================================
// CsvUpload - 上传文件（字节流 + 文件名）
// ==========================================
// 文件名只用于错误信息与导入日志
#[derive(Debug, Clone)]
pub struct CsvUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl CsvUpload {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }

    /// 从磁盘读取（文件不可读视为输入格式错误）
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ImportError> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        let bytes = std::fs::read(path)
            .map_err(|e| ImportError::malformed(&file_name, format!("文件读取失败: {}", e)))?;
        Ok(Self { file_name, bytes })
    }
}

// ==========================================
// ParsedCsv - 解析结果
// ==========================================
pub struct ParsedCsv {
    pub header: Vec<String>,
    pub delimiter: u8,
    pub rows: CsvRows,
}

/// 单遍、不可重启的数据行序列；重读需重新调用 parse
pub struct CsvRows {
    records: StringRecordsIntoIter<Cursor<Vec<u8>>>,
    ordinal: usize,
}

impl Iterator for CsvRows {
    type Item = Result<RawRow, RowError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let next = self.records.next()?;
            self.ordinal += 1;
            // 表头为第 1 行
            let row_number = self.ordinal + 1;

            match next {
                Ok(record) => {
                    let row = RawRow::new(row_number, record.iter().map(|c| c.to_string()).collect());
                    // 跳过完全空白的行
                    if row.is_blank() {
                        continue;
                    }
                    return Some(Ok(row));
                }
                Err(e) => {
                    return Some(Err(RowError::new(
                        row_number,
                        None,
                        RowErrorReason::MalformedRecord(e.to_string()),
                    )))
                }
            }
        }
    }
}

// ==========================================
// CsvReader
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct CsvReader {
    delimiter_override: Option<u8>,
}

impl CsvReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// 指定分隔符（跳过自动识别）
    pub fn with_delimiter(delimiter: Option<u8>) -> Self {
        Self {
            delimiter_override: delimiter,
        }
    }

    /// 解析字节流
    ///
    /// # 返回
    /// - Ok(ParsedCsv): 表头 + 惰性数据行
    /// - Err(MalformedInput): 非 UTF-8 文本 / 无表头
    #[instrument(skip(self, upload), fields(file_name = %upload.file_name, bytes = upload.bytes.len()))]
    pub fn parse(&self, upload: &CsvUpload) -> Result<ParsedCsv, ImportError> {
        let body = upload
            .bytes
            .strip_prefix(UTF8_BOM)
            .unwrap_or(&upload.bytes[..]);

        let text = std::str::from_utf8(body).map_err(|e| {
            ImportError::malformed(&upload.file_name, format!("无法按 UTF-8 解码: {}", e))
        })?;

        let delimiter = self
            .delimiter_override
            .unwrap_or_else(|| detect_delimiter(text));

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .delimiter(delimiter)
            .flexible(true) // 允许行长度不一致
            .trim(Trim::None)
            .from_reader(Cursor::new(body.to_vec()));

        let header: Vec<String> = reader
            .headers()
            .map_err(|e| ImportError::malformed(&upload.file_name, format!("表头解析失败: {}", e)))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        if header.iter().all(|h| h.is_empty()) {
            return Err(ImportError::malformed(&upload.file_name, "缺少表头行"));
        }

        debug!(
            columns = header.len(),
            delimiter = %(delimiter as char),
            "CSV 表头解析完成"
        );

        Ok(ParsedCsv {
            header,
            delimiter,
            rows: CsvRows {
                records: reader.into_records(),
                ordinal: 0,
            },
        })
    }
}

/// 按表头行中引号外的出现次数决定分隔符（平票取逗号）
pub fn detect_delimiter(text: &str) -> u8 {
    let mut commas = 0usize;
    let mut semicolons = 0usize;
    let mut in_quotes = false;

    for ch in text.chars() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => commas += 1,
            ';' if !in_quotes => semicolons += 1,
            '\n' | '\r' if !in_quotes => break,
            _ => {}
        }
    }

    if semicolons > commas {
        b';'
    } else {
        b','
    }
}
