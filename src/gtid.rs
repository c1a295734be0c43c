//! GTID (Global Transaction ID) 집합
//!
//! GTID 형식: UUID:sequence-number
//! 여러 서버의 GTID 집합: "uuid1:1-100:200,uuid2:1-50"

use crate::error::{CdcError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// GTID 범위 (양 끝 포함)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GtidRange {
    pub start: u64,
    pub end: u64,
}

impl GtidRange {
    pub fn new(start: u64, end: u64) -> Result<Self> {
        if start == 0 || start > end {
            return Err(CdcError::GtidError(format!(
                "Invalid range: {}-{}",
                start, end
            )));
        }
        Ok(GtidRange { start, end })
    }

    pub fn contains(&self, value: u64) -> bool {
        value >= self.start && value <= self.end
    }

    /// 겹치거나 맞닿은 범위면 합친다
    fn merge(&self, other: &GtidRange) -> Option<GtidRange> {
        if self.end.saturating_add(1) >= other.start && other.end.saturating_add(1) >= self.start {
            Some(GtidRange {
                start: self.start.min(other.start),
                end: self.end.max(other.end),
            })
        } else {
            None
        }
    }

    fn parse(s: &str) -> Result<Self> {
        let invalid = || CdcError::GtidError(format!("Invalid range: {}", s));
        match s.split_once('-') {
            Some((start, end)) => {
                let start = start.trim().parse().map_err(|_| invalid())?;
                let end = end.trim().parse().map_err(|_| invalid())?;
                GtidRange::new(start, end)
            }
            None => {
                let seq = s.trim().parse().map_err(|_| invalid())?;
                GtidRange::new(seq, seq)
            }
        }
    }
}

impl fmt::Display for GtidRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// 정렬 + 병합된 범위 목록으로 정규화
fn normalize(ranges: &mut Vec<GtidRange>) {
    ranges.sort();
    let mut merged: Vec<GtidRange> = Vec::with_capacity(ranges.len());
    for range in ranges.drain(..) {
        match merged.last_mut() {
            Some(last) => match last.merge(&range) {
                Some(m) => *last = m,
                None => merged.push(range),
            },
            None => merged.push(range),
        }
    }
    *ranges = merged;
}

/// 전체 GTID 집합 (서버 UUID별 범위 목록)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GtidSet {
    sets: BTreeMap<Uuid, Vec<GtidRange>>,
}

impl GtidSet {
    pub fn new() -> Self {
        GtidSet {
            sets: BTreeMap::new(),
        }
    }

    /// GTID 집합 문자열 파싱
    ///
    /// MySQL 표준 형식 `"uuid:1-100:200,uuid2:1-50"` 외에
    /// `"uuid:1-100,200"` 처럼 콤마로 이어진 범위도 직전 UUID에 붙인다.
    pub fn parse(gtid_str: &str) -> Result<Self> {
        let mut gtid_set = GtidSet::new();
        let trimmed = gtid_str.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("NULL") {
            return Ok(gtid_set);
        }

        let mut current: Option<Uuid> = None;
        for segment in trimmed.split(',') {
            // gtid_executed는 서버별로 줄바꿈이 섞여 나온다
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }

            let mut parts = segment.split(':');
            let head = parts.next().unwrap_or_default();
            let (sid, ranges): (Uuid, Vec<&str>) = if segment.contains(':') {
                let sid = Uuid::parse_str(head.trim()).map_err(|e| {
                    CdcError::GtidError(format!("Invalid server uuid {}: {}", head, e))
                })?;
                (sid, parts.collect())
            } else {
                let sid = current.ok_or_else(|| {
                    CdcError::GtidError(format!("Range without server uuid: {}", segment))
                })?;
                (sid, vec![head])
            };

            let entry = gtid_set.sets.entry(sid).or_default();
            for range in ranges {
                entry.push(GtidRange::parse(range)?);
            }
            normalize(entry);
            current = Some(sid);
        }

        Ok(gtid_set)
    }

    /// 단일 GTID 추가 (format: "uuid:sequence")
    pub fn add_gtid(&mut self, gtid: &str) -> Result<()> {
        let (sid, sequence) = split_gtid(gtid)?;
        self.add(sid, sequence)
    }

    pub fn add(&mut self, sid: Uuid, sequence: u64) -> Result<()> {
        let range = GtidRange::new(sequence, sequence)?;
        let ranges = self.sets.entry(sid).or_default();
        ranges.push(range);
        normalize(ranges);
        Ok(())
    }

    pub fn contains(&self, gtid: &str) -> bool {
        match split_gtid(gtid) {
            Ok((sid, sequence)) => self
                .sets
                .get(&sid)
                .map(|ranges| ranges.iter().any(|r| r.contains(sequence)))
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    /// 다른 집합을 합친다
    pub fn union(&mut self, other: &GtidSet) {
        for (sid, other_ranges) in &other.sets {
            let ranges = self.sets.entry(*sid).or_default();
            ranges.extend_from_slice(other_ranges);
            normalize(ranges);
        }
    }

    /// self - other
    pub fn subtract(&self, other: &GtidSet) -> GtidSet {
        let mut result = GtidSet::new();

        for (sid, ranges) in &self.sets {
            let mut remaining = ranges.clone();
            if let Some(removed) = other.sets.get(sid) {
                for cut in removed {
                    remaining = remaining
                        .into_iter()
                        .flat_map(|r| {
                            let mut pieces = Vec::with_capacity(2);
                            if r.end < cut.start || r.start > cut.end {
                                pieces.push(r);
                            } else {
                                if r.start < cut.start {
                                    pieces.push(GtidRange {
                                        start: r.start,
                                        end: cut.start - 1,
                                    });
                                }
                                if r.end > cut.end {
                                    pieces.push(GtidRange {
                                        start: cut.end + 1,
                                        end: r.end,
                                    });
                                }
                            }
                            pieces
                        })
                        .collect();
                }
            }
            if !remaining.is_empty() {
                result.sets.insert(*sid, remaining);
            }
        }

        result
    }

    pub fn is_empty(&self) -> bool {
        self.sets.values().all(|ranges| ranges.is_empty())
    }

    /// 서버 UUID 개수
    pub fn server_count(&self) -> usize {
        self.sets.values().filter(|ranges| !ranges.is_empty()).count()
    }
}

fn split_gtid(gtid: &str) -> Result<(Uuid, u64)> {
    let (sid, sequence) = gtid
        .trim()
        .split_once(':')
        .ok_or_else(|| CdcError::GtidError(format!("Invalid GTID format: {}", gtid)))?;
    let sid = Uuid::parse_str(sid)
        .map_err(|e| CdcError::GtidError(format!("Invalid server uuid {}: {}", sid, e)))?;
    let sequence = sequence
        .parse::<u64>()
        .map_err(|_| CdcError::GtidError(format!("Invalid sequence: {}", sequence)))?;
    Ok((sid, sequence))
}

impl fmt::Display for GtidSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (sid, ranges) in &self.sets {
            if ranges.is_empty() {
                continue;
            }
            if !first {
                f.write_str(",")?;
            }
            first = false;
            write!(f, "{}", sid)?;
            for range in ranges {
                write!(f, ":{}", range)?;
            }
        }
        Ok(())
    }
}

impl FromStr for GtidSet {
    type Err = CdcError;

    fn from_str(s: &str) -> Result<Self> {
        GtidSet::parse(s)
    }
}

impl TryFrom<String> for GtidSet {
    type Error = CdcError;

    fn try_from(value: String) -> Result<Self> {
        GtidSet::parse(&value)
    }
}

impl From<GtidSet> for String {
    fn from(set: GtidSet) -> Self {
        set.to_string()
    }
}
