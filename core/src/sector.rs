//! Sector space: the fixed, ordered set of internal sectors for one year.
//!
//! RULE: A, L, W and Y of a year share exactly one ordering.
//! Every index into those structures is an index into the SectorSpace.
//! Classification is attached at construction, never inferred from names.

use crate::{
    error::{TwfError, TwfResult},
    types::{Matrix, SectorCode, StudyYear, Vector},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Broad source-sector taxonomy used by the source view and scenario bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectorClass {
    Agriculture,
    Mining,
    Manufacturing,
    Petroleum,
    Electricity,
    Services,
}

impl SectorClass {
    /// Report order. Never reorder; artifact columns follow it.
    pub const ALL: [SectorClass; 6] = [
        Self::Agriculture,
        Self::Mining,
        Self::Manufacturing,
        Self::Petroleum,
        Self::Electricity,
        Self::Services,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Agriculture   => "Agriculture",
            Self::Mining        => "Mining",
            Self::Manufacturing => "Manufacturing",
            Self::Petroleum     => "Petroleum",
            Self::Electricity   => "Electricity",
            Self::Services      => "Services",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sector {
    pub code:            SectorCode,
    pub name:            String,
    pub class:           SectorClass,
    /// Destination-view label, e.g. "Food Mfg".
    pub demand_category: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SectorSpace {
    sectors: Vec<Sector>,
    index:   HashMap<SectorCode, usize>,
}

impl SectorSpace {
    pub fn new(year: StudyYear, sectors: Vec<Sector>) -> TwfResult<Self> {
        let mut index = HashMap::with_capacity(sectors.len());
        for (i, s) in sectors.iter().enumerate() {
            if index.insert(s.code.clone(), i).is_some() {
                return Err(TwfError::concordance(
                    year,
                    &s.code,
                    "sector code appears twice in the sector space",
                ));
            }
        }
        Ok(Self { sectors, index })
    }

    pub fn len(&self) -> usize {
        self.sectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sectors.is_empty()
    }

    pub fn sectors(&self) -> &[Sector] {
        &self.sectors
    }

    pub fn get(&self, i: usize) -> &Sector {
        &self.sectors[i]
    }

    pub fn index_of(&self, code: &str) -> Option<usize> {
        self.index.get(code).copied()
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.sectors.iter().map(|s| s.code.as_str())
    }

    /// Same codes in the same order.
    pub fn same_ordering(&self, other: &SectorSpace) -> bool {
        self.len() == other.len() && self.codes().eq(other.codes())
    }

    /// Mask of sectors whose class is in `classes`.
    pub fn class_mask(&self, classes: &[SectorClass]) -> Vec<bool> {
        self.sectors.iter().map(|s| classes.contains(&s.class)).collect()
    }

    /// Positions in `from` of each of our codes. Fails if `from`
    /// lacks any code or carries extra ones.
    fn permutation_from(&self, year: StudyYear, from: &SectorSpace) -> TwfResult<Vec<usize>> {
        if from.len() != self.len() {
            return Err(TwfError::dimension(year, "sector space size", self.len(), from.len()));
        }
        self.sectors
            .iter()
            .map(|s| {
                from.index_of(&s.code).ok_or_else(|| {
                    TwfError::concordance(year, &s.code, "sector missing from the other year's space")
                })
            })
            .collect()
    }

    /// Reorder a vector laid out in `from` onto this ordering.
    pub fn reconcile_vector(
        &self,
        year: StudyYear,
        from: &SectorSpace,
        v: &Vector,
    ) -> TwfResult<Vector> {
        let perm = self.permutation_from(year, from)?;
        Ok(Vector::from_iterator(perm.len(), perm.iter().map(|&k| v[k])))
    }

    /// Reorder rows and columns of a square matrix laid out in `from`.
    pub fn reconcile_matrix(
        &self,
        year: StudyYear,
        from: &SectorSpace,
        m: &Matrix,
    ) -> TwfResult<Matrix> {
        let perm = self.permutation_from(year, from)?;
        let n = perm.len();
        Ok(Matrix::from_fn(n, n, |i, j| m[(perm[i], perm[j])]))
    }
}
