use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// An interferometric measurement identified by its two acquisition dates.
///
/// The constructor normalizes the pair so that `first <= second`, which makes
/// equality, hashing and ordering independent of the direction the dates were
/// supplied in: an edge and its reverse are the same key.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Edge {
    pub first: NaiveDate,
    pub second: NaiveDate,
}

impl Edge {
    /// Create an edge from two acquisition dates, in either order.
    pub fn new(a: NaiveDate, b: NaiveDate) -> Self {
        if a <= b {
            Self { first: a, second: b }
        } else {
            Self { first: b, second: a }
        }
    }

    /// Temporal baseline of the measurement in days.
    ///
    /// Loop weights are sums of these spans, so shorter-baseline loops sort
    /// first and survive greedy capping preferentially.
    pub fn span_days(&self) -> i64 {
        (self.second - self.first).num_days()
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.first, self.second)
    }
}

/// Traversal direction of an edge within one loop, relative to the edge's
/// canonical (earlier date -> later date) direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeSign {
    Forward,
    Reverse,
}

impl EdgeSign {
    /// Multiplicative factor applied to the phase when summing around a loop.
    pub fn factor(self) -> f32 {
        match self {
            EdgeSign::Forward => 1.0,
            EdgeSign::Reverse => -1.0,
        }
    }
}

/// An [`Edge`] tagged with its traversal direction within a specific loop.
///
/// The same edge may appear `Forward` in one loop and `Reverse` in another;
/// the sign is a property of the traversal, never of the edge itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignedEdge {
    pub edge: Edge,
    pub sign: EdgeSign,
}

impl SignedEdge {
    pub fn new(edge: Edge, sign: EdgeSign) -> Self {
        Self { edge, sign }
    }

    /// The date this signed edge departs from when walked in loop order.
    pub fn start(&self) -> NaiveDate {
        match self.sign {
            EdgeSign::Forward => self.edge.first,
            EdgeSign::Reverse => self.edge.second,
        }
    }

    /// The date this signed edge arrives at when walked in loop order.
    pub fn end(&self) -> NaiveDate {
        match self.sign {
            EdgeSign::Forward => self.edge.second,
            EdgeSign::Reverse => self.edge.first,
        }
    }
}

impl fmt::Display for SignedEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = match self.sign {
            EdgeSign::Forward => '+',
            EdgeSign::Reverse => '-',
        };
        write!(f, "{}{}", sign, self.edge)
    }
}
