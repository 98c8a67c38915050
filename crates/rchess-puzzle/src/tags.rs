//! パズルテーマ（タグ）の分類
//!
//! 手数バケットは「入力順で最初に現れた手数タグ」で決まる。4種のタグの間に
//! 固定の優先順位はない（`["long", "short"]` は `long`）。

use std::collections::{BTreeSet, HashSet};
use std::fmt;

/// 解答手数による分類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LengthBucket {
    OneMove,
    Short,
    Long,
    VeryLong,
    /// 手数タグが1つもない
    NoLength,
}

impl LengthBucket {
    /// 入力タグとして現れる手数タグ
    pub const TAGGED: [LengthBucket; 4] = [
        LengthBucket::OneMove,
        LengthBucket::Short,
        LengthBucket::Long,
        LengthBucket::VeryLong,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LengthBucket::OneMove => "oneMove",
            LengthBucket::Short => "short",
            LengthBucket::Long => "long",
            LengthBucket::VeryLong => "veryLong",
            LengthBucket::NoLength => "noLength",
        }
    }

    /// 手数タグ（大文字小文字を区別）をバケットに変換する
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::TAGGED.into_iter().find(|bucket| bucket.as_str() == tag)
    }
}

impl fmt::Display for LengthBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 保存対象テーマの既定語彙（40種）
///
/// 手数タグ、メイトパターン名（backRankMate, mateIn2 等）、対局者レベル
/// （master, superGM 等）は含めない。
pub const REFERENCE_SAVABLE_TAGS: [&str; 40] = [
    "advancedPawn",
    "advantage",
    "attackingF2F7",
    "attraction",
    "bishopEndgame",
    "capturingDefender",
    "castling",
    "clearance",
    "crushing",
    "defensiveMove",
    "deflection",
    "discoveredAttack",
    "doubleCheck",
    "enPassant",
    "endgame",
    "equality",
    "exposedKing",
    "fork",
    "hangingPiece",
    "interference",
    "intermezzo",
    "kingsideAttack",
    "knightEndgame",
    "mate",
    "middlegame",
    "opening",
    "pawnEndgame",
    "pin",
    "promotion",
    "queenEndgame",
    "queenRookEndgame",
    "queensideAttack",
    "quietMove",
    "rookEndgame",
    "sacrifice",
    "skewer",
    "trappedPiece",
    "underPromotion",
    "xRayAttack",
    "zugzwang",
];

/// 1パズル分の分類結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub bucket: LengthBucket,
    /// 保存対象テーマ（重複なし）。空ならこのパズルは出力されない
    pub savable: BTreeSet<String>,
}

/// タグ分類器
#[derive(Debug, Clone)]
pub struct TagClassifier {
    vocabulary: HashSet<String>,
}

impl TagClassifier {
    /// 任意の語彙で分類器を作る。手数タグは語彙に入れても保存対象にならない
    pub fn new<I, S>(vocabulary: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let vocabulary = vocabulary
            .into_iter()
            .map(Into::into)
            .filter(|tag: &String| LengthBucket::from_tag(tag).is_none())
            .collect();
        Self { vocabulary }
    }

    pub fn vocabulary_len(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn is_savable(&self, tag: &str) -> bool {
        self.vocabulary.contains(tag)
    }

    pub fn classify<S: AsRef<str>>(&self, raw_tags: &[S]) -> Classification {
        let bucket = raw_tags
            .iter()
            .find_map(|tag| LengthBucket::from_tag(tag.as_ref()))
            .unwrap_or(LengthBucket::NoLength);

        let savable = raw_tags
            .iter()
            .map(|tag| tag.as_ref())
            .filter(|tag| self.is_savable(tag))
            .map(str::to_string)
            .collect();

        Classification { bucket, savable }
    }
}

impl Default for TagClassifier {
    fn default() -> Self {
        Self::new(REFERENCE_SAVABLE_TAGS)
    }
}
