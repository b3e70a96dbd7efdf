//! Global R-group numbering against the full scaffold.
//!
//! The full scaffold is the scaffold plus one R-site per distinct R-group
//! position seen so far. A new match reuses an R-site whose scaffold
//! neighbours coincide with the atoms its R-group hangs from, trying every
//! scaffold automorphism, and opens new R-sites only for what is left.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::{
    automorphism::Permutation,
    error::{Error, Result},
    molecule::{Atom, Bond, Molecule},
};

use super::matches::DecompositionMatch;

type Signatures = BTreeMap<Vec<usize>, Vec<u32>>;

/// The scaffold extended with every R-site assigned so far.
#[derive(Debug, Clone, Default)]
pub struct FullScaffold {
    pub(crate) molecule: Molecule,
    pub(crate) user_defined: bool,
    pub(crate) order_penalty: i64,
}

impl FullScaffold {
    pub fn molecule(&self) -> &Molecule {
        &self.molecule
    }

    /// The scaffold was given with its own R-sites, which are then never
    /// extended.
    pub fn is_user_defined(&self) -> bool {
        self.user_defined
    }

    /// Assign a global R-group index to every R-group of `found`. With
    /// `extend`, R-groups without a matching R-site get one added to the
    /// full scaffold. The result is indexed by the R-group position in
    /// `found`.
    pub fn assign(
        &mut self,
        found: &DecompositionMatch,
        molecule: &Molecule,
        extend: bool,
    ) -> Result<Vec<u32>> {
        let (signatures, max_index) = self.signatures();
        if found.automorphisms.is_empty() {
            return Err(Error::NullAutomorphism);
        }

        let mut best: Option<(usize, usize, i64)> = None;
        for (i, auto) in found.automorphisms.iter().enumerate() {
            let (indices, created) = rgroup_indices(found, auto, signatures.clone(), max_index)?;
            let score = self.score(&indices);
            let better = match best {
                None => true,
                Some((_, best_created, best_score)) => {
                    created < best_created || (created == best_created && score < best_score)
                }
            };
            if better {
                best = Some((i, created, score));
            }
        }
        let Some((chosen, created, _)) = best else {
            return Err(Error::NullAutomorphism);
        };

        let auto = &found.automorphisms[chosen];
        let (indices, _) = rgroup_indices(found, auto, signatures, max_index)?;
        if extend && !self.user_defined {
            for (rg, &idx) in indices.iter().enumerate() {
                if idx > max_index {
                    self.add_rsite(found, molecule, auto, rg, idx)?;
                }
            }
        }
        debug!(automorphism = chosen, created, "R-groups numbered");
        Ok(indices)
    }

    /// R-site index lists keyed by the sorted scaffold neighbours of each
    /// R-site, and the largest index in use.
    fn signatures(&self) -> (Signatures, u32) {
        let mut signatures = Signatures::new();
        let mut max_index = 0;
        for rsite in self.molecule.rsites() {
            let Some(idx) = self.molecule.atom(rsite).and_then(Atom::rsite_index) else {
                continue;
            };
            max_index = max_index.max(idx);
            signatures
                .entry(self.molecule.neighbors(rsite))
                .or_default()
                .push(idx);
        }
        (signatures, max_index)
    }

    /// Sum of the indices, with every descent in the sequence penalised so
    /// that R-groups keep the order they are found in.
    fn score(&self, indices: &[u32]) -> i64 {
        let mut score = 0;
        for (i, &idx) in indices.iter().enumerate() {
            score += i64::from(idx);
            if i > 0 && indices[i - 1] > idx {
                score += self.order_penalty * i64::from(indices[i - 1] - idx);
            }
        }
        score
    }

    /// Add an R-site with index `idx` for R-group `rg`, placed at the
    /// first atom of the R-group and bonded to its scaffold neighbours.
    fn add_rsite(
        &mut self,
        found: &DecompositionMatch,
        molecule: &Molecule,
        auto: &Permutation,
        rg: usize,
        idx: u32,
    ) -> Result<()> {
        let indexes = &found.attachment_index[rg];
        let orders = &found.attachment_order[rg];
        let Some(&first) = indexes.first() else {
            return Ok(());
        };
        let position = molecule.atom(first).map(Atom::position).unwrap_or_default();
        let rsite = self.molecule.add_atom(Atom::rsite(idx).with_position(position));

        for (&index, &order) in indexes.iter().zip(orders) {
            let own = scaffold_image(found, auto, order)?;
            if self.molecule.find_bond(rsite, own).is_some() {
                continue;
            }
            if molecule.find_bond(order, index).is_none() {
                return Err(Error::MissingScaffoldEdge);
            }
            self.molecule.add_bond(rsite, own, Bond::Single);
        }
        Ok(())
    }
}

/// Scaffold atom standing for molecule atom `order` once `auto` is applied.
fn scaffold_image(found: &DecompositionMatch, auto: &Permutation, order: usize) -> Result<usize> {
    found
        .inv_mapping
        .get(order)
        .copied()
        .flatten()
        .and_then(|own| auto.get(own).copied().flatten())
        .ok_or(Error::UndefinedMapping)
}

/// Indices for every R-group of `found` under `auto`, consuming matching
/// R-sites from `signatures` last-in first-out. Returns the indices and
/// how many of them are new.
fn rgroup_indices(
    found: &DecompositionMatch,
    auto: &Permutation,
    mut signatures: Signatures,
    mut max_index: u32,
) -> Result<(Vec<u32>, usize)> {
    let mut created = 0;
    let mut indices = Vec::with_capacity(found.rgroup_count());
    for orders in &found.attachment_order {
        let key = orders
            .iter()
            .map(|&order| scaffold_image(found, auto, order))
            .collect::<Result<BTreeSet<_>>>()?
            .into_iter()
            .collect::<Vec<_>>();

        match signatures.get_mut(&key).and_then(Vec::pop) {
            Some(idx) => indices.push(idx),
            None => {
                max_index += 1;
                created += 1;
                indices.push(max_index);
            }
        }
    }
    Ok((indices, created))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scaffold(penalty: i64) -> FullScaffold {
        FullScaffold {
            order_penalty: penalty,
            ..FullScaffold::default()
        }
    }

    #[test]
    fn ascending_indices_score_lowest() {
        let full = scaffold(100);
        assert_eq!(full.score(&[1, 2, 3]), 6);
        assert_eq!(full.score(&[2, 1, 3]), 106);
        assert_eq!(full.score(&[3, 1]), 204);
        assert!(scaffold(0).score(&[2, 1]) == scaffold(0).score(&[1, 2]));
    }

    #[test]
    fn signatures_group_rsites_by_neighbours() {
        let mut full = scaffold(100);
        let c = full.molecule.add_atom(Atom::new(crate::molecule::Element::Carbon));
        for idx in [1, 2] {
            let r = full.molecule.add_atom(Atom::rsite(idx));
            full.molecule.add_bond(r, c, Bond::Single);
        }
        let (signatures, max_index) = full.signatures();
        assert_eq!(max_index, 2);
        assert_eq!(signatures.get(&vec![c]), Some(&vec![1, 2]));
    }
}
