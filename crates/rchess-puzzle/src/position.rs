//! パズル局面の導出
//!
//! パズルの手順は「相手の初手 → 解答手 → ...」の順に並んでいる。
//! 開始局面に初手を適用した局面が出題局面、2手目が解答手になる。

use shakmaty::fen::Fen;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, EnPassantMode, Position};

use crate::error::{PuzzleError, Result};

/// 合法手判定と局面更新を担う外部ルール実装
pub trait RulesOracle {
    /// `position`（FEN）に `mv`（UCI）を適用した局面の FEN を返す。
    ///
    /// 非合法手、または開始局面が読めない場合は `PuzzleError::IllegalMove`。
    fn apply_move(&self, position: &str, mv: &str) -> Result<String>;
}

/// shakmaty による標準ルール実装
#[derive(Debug, Clone, Copy, Default)]
pub struct ShakmatyOracle;

impl RulesOracle for ShakmatyOracle {
    fn apply_move(&self, position: &str, mv: &str) -> Result<String> {
        let illegal = |reason: String| PuzzleError::IllegalMove {
            fen: position.to_string(),
            mv: mv.to_string(),
            reason,
        };

        let fen: Fen = position.parse().map_err(|e| illegal(format!("invalid FEN: {e}")))?;
        let pos: Chess = fen
            .into_position(CastlingMode::Standard)
            .map_err(|e| illegal(format!("invalid position: {e}")))?;
        let uci: UciMove = mv.parse().map_err(|e| illegal(format!("invalid UCI move: {e}")))?;
        let m = uci.to_move(&pos).map_err(|e| illegal(e.to_string()))?;

        let mut next = pos;
        next.play_unchecked(&m);

        // アンパッサンは実際に取れる場合のみ出力する（lichess のデータと同じ表記）
        Ok(Fen(next.into_setup(EnPassantMode::Legal)).to_string())
    }
}

/// 出題局面と解答手
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedPuzzle {
    pub position: String,
    pub answer_move: String,
}

impl DerivedPuzzle {
    /// 出力ファイルの1行（`<position>,<answer_move>`）
    pub fn to_line(&self) -> String {
        format!("{},{}", self.position, self.answer_move)
    }
}

/// 開始局面に初手を適用し、出題局面と解答手を得る
///
/// 解答手（`moves[1]`）は適用も検証もしない。
pub fn derive<O, S>(oracle: &O, start_position: &str, moves: &[S]) -> Result<DerivedPuzzle>
where
    O: RulesOracle + ?Sized,
    S: AsRef<str>,
{
    let [first, answer, ..] = moves else {
        return Err(PuzzleError::MalformedRow(format!(
            "expected at least 2 moves, got {}",
            moves.len()
        )));
    };

    let position = oracle.apply_move(start_position, first.as_ref())?;
    Ok(DerivedPuzzle {
        position,
        answer_move: answer.as_ref().to_string(),
    })
}
