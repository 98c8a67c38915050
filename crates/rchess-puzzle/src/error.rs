//! パズル取り込み処理のエラー型

use std::io;

/// 取り込みパイプラインで発生するエラー
///
/// `IllegalMove` と `MalformedRow` はレコード単位のエラー。中断するかスキップするかは
/// パイプライン側が判断する。
#[derive(Debug, thiserror::Error)]
pub enum PuzzleError {
    /// 初手が開始局面で合法でない（開始局面自体が読めない場合も含む）
    #[error("illegal move `{mv}` in position `{fen}`: {reason}")]
    IllegalMove {
        fen: String,
        mv: String,
        reason: String,
    },

    /// 行の列数・形式が想定と異なる
    #[error("malformed row: {0}")]
    MalformedRow(String),

    /// 行番号付きのレコード単位エラー
    #[error("line {line}: {source}")]
    AtLine {
        line: u64,
        #[source]
        source: Box<PuzzleError>,
    },

    /// 設定ファイル・設定値の不正
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl PuzzleError {
    /// 行番号を付与する
    pub fn at_line(self, line: u64) -> Self {
        PuzzleError::AtLine {
            line,
            source: Box::new(self),
        }
    }

    /// 行番号の包みを外した元のエラー
    pub fn root(&self) -> &PuzzleError {
        match self {
            PuzzleError::AtLine { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_malformed_row(&self) -> bool {
        matches!(self.root(), PuzzleError::MalformedRow(_))
    }

    pub fn is_illegal_move(&self) -> bool {
        matches!(self.root(), PuzzleError::IllegalMove { .. })
    }
}

pub type Result<T> = std::result::Result<T, PuzzleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_at_line_keeps_kind() {
        let err = PuzzleError::MalformedRow("missing column 7".to_string()).at_line(12);
        assert!(err.is_malformed_row());
        assert!(!err.is_illegal_move());
        assert_eq!(err.to_string(), "line 12: malformed row: missing column 7");
    }
}
