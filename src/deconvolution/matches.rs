//! Scaffold embeddings turned into scaffold/R-group partitions.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use tracing::trace;

use crate::{
    automorphism::{automorphisms, Permutation},
    error::{Error, Result},
    matching::{Matcher, MoleculeMatcher, ScaffoldMatcher},
    molecule::{Atom, Bond, Molecule},
};

/// What an atom of the decomposed molecule belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AtomRole {
    #[default]
    Unvisited,
    Scaffold,
    /// Member of the R-group at this position of the match.
    RGroup(usize),
}

/// One way of laying the scaffold over a molecule.
///
/// R-groups are numbered by position here; the global R-group indices are
/// assigned when the match is committed to a full scaffold.
#[derive(Debug, Clone, Default)]
pub struct DecompositionMatch {
    pub(crate) roles: Vec<AtomRole>,
    pub(crate) scaffold_atoms: Vec<usize>,
    pub(crate) scaffold_bonds: Vec<usize>,
    /// Scaffold atom to molecule atom.
    pub(crate) mapping: Vec<Option<usize>>,
    /// Molecule atom to scaffold atom.
    pub(crate) inv_mapping: Vec<Option<usize>>,
    /// Per R-group: the R-group side atom of every attachment bond.
    pub(crate) attachment_index: Vec<Vec<usize>>,
    /// Per R-group: the scaffold side atom of every attachment bond.
    pub(crate) attachment_order: Vec<Vec<usize>>,
    pub(crate) automorphisms: Vec<Permutation>,
    pub(crate) molecule: Molecule,
    pub(crate) rgroup_molecule: Molecule,
    pub(crate) scaffold_molecule: Molecule,
    pub(crate) complete: bool,
}

impl DecompositionMatch {
    pub fn rgroup_count(&self) -> usize {
        self.attachment_index.len()
    }

    /// Role of every atom of the decomposed molecule, by atom id.
    pub fn roles(&self) -> &[AtomRole] {
        &self.roles
    }

    /// Molecule atoms covered by the scaffold, ascending.
    pub fn scaffold_atoms(&self) -> &[usize] {
        &self.scaffold_atoms
    }

    pub fn scaffold_bonds(&self) -> &[usize] {
        &self.scaffold_bonds
    }

    /// Image of every scaffold atom in the molecule.
    pub fn scaffold_mapping(&self) -> &[Option<usize>] {
        &self.mapping
    }

    /// The molecule with the scaffold highlighted.
    pub fn highlighted(&self) -> &Molecule {
        &self.molecule
    }

    /// The matched part of the molecule.
    pub fn scaffold_submolecule(&self) -> &Molecule {
        &self.scaffold_molecule
    }

    /// The matched part plus one R-site per R-group, with the R-group
    /// fragments stored under the R-site indices.
    pub fn rgroup_molecule(&self) -> &Molecule {
        &self.rgroup_molecule
    }

    /// Per R-group, every attachment bond as `(scaffold atom, R-group atom)`
    /// in molecule ids. A ring closure lists both directions.
    pub fn attachment_map(&self) -> Vec<Vec<(usize, usize)>> {
        self.attachment_order
            .iter()
            .zip(&self.attachment_index)
            .map(|(orders, indexes)| orders.iter().copied().zip(indexes.iter().copied()).collect())
            .collect()
    }

    fn swap_rgroups(&mut self, a: usize, b: usize) {
        self.attachment_order.swap(a, b);
        self.attachment_index.swap(a, b);
        for role in self.roles.iter_mut() {
            *role = match *role {
                AtomRole::RGroup(x) if x == a => AtomRole::RGroup(b),
                AtomRole::RGroup(x) if x == b => AtomRole::RGroup(a),
                other => other,
            };
        }
    }
}

/// Collects the matches of one molecule while embeddings are enumerated.
pub(crate) struct MatchCollector<'s> {
    pub scaffold: &'s Molecule,
    pub scaffold_automorphisms: Vec<Permutation>,
    pub remove_rsites: bool,
    pub all_matches: bool,
    pub matches: Vec<DecompositionMatch>,
}

impl<'s> MatchCollector<'s> {
    pub fn new(scaffold: &'s Molecule, remove_rsites: bool, all_matches: bool) -> Self {
        Self {
            scaffold,
            scaffold_automorphisms: automorphisms(scaffold.graph(), MoleculeMatcher),
            remove_rsites,
            all_matches,
            matches: Vec::new(),
        }
    }

    /// Handle one embedding. Returns whether enumeration should go on.
    pub fn on_embedding(
        &mut self,
        molecule: &Molecule,
        map: &[Option<usize>],
        inv_map: &[Option<usize>],
    ) -> Result<bool> {
        let mut mapping = map.to_vec();
        let mut inv_mapping = inv_map.to_vec();
        if self.remove_rsites {
            if mapping.len() != self.scaffold.atom_end() {
                return Err(Error::UndefinedMapping);
            }
            for v in self.scaffold.rsites() {
                if let Some(t) = mapping[v].take() {
                    inv_mapping[t] = None;
                }
            }
        }

        if self.covers_known_atoms(&mapping) {
            return Ok(self.all_matches);
        }

        let found = partition(self.scaffold, molecule, mapping, inv_mapping)?;
        self.add_match(found, molecule)?;
        Ok(self.all_matches)
    }

    /// The embedding covers exactly the atoms of an earlier match.
    fn covers_known_atoms(&self, mapping: &[Option<usize>]) -> bool {
        let covered = mapping.iter().flatten().copied().collect::<BTreeSet<_>>();
        self.matches.iter().any(|m| {
            m.scaffold_atoms.len() == covered.len()
                && m.scaffold_atoms.iter().all(|a| covered.contains(a))
        })
    }

    /// Store `found` together with one copy per distinct R-group
    /// permutation induced by the symmetry of the scaffold with R-sites.
    fn add_match(&mut self, mut found: DecompositionMatch, molecule: &Molecule) -> Result<()> {
        let mut autos = self.scaffold_automorphisms.clone();
        refine_automorphisms(&mut autos, self.scaffold, molecule, &found.mapping)?;
        found.automorphisms = autos;

        let mut with_rsites = self.scaffold.clone_keep_indices();
        if self.remove_rsites {
            for v in with_rsites.rsites() {
                with_rsites.remove_atom(v);
            }
        }
        let rsites = add_all_rsites(&mut with_rsites, &found)?;

        let mut autos = automorphisms(with_rsites.graph(), MoleculeMatcher);
        refine_automorphisms(&mut autos, &with_rsites, molecule, &found.mapping)?;

        let mut orders = vec![rsites.keys().copied().collect::<Vec<_>>()];
        let mut variants = Vec::new();
        for auto in &autos {
            let mut swap_order = Vec::with_capacity(rsites.len());
            for &rs in rsites.keys() {
                match auto.get(rs).copied().flatten() {
                    Some(image) if rsites.contains_key(&image) => swap_order.push(image),
                    _ => return Err(Error::IncorrectAutomorphism),
                }
            }
            if orders.contains(&swap_order) {
                continue;
            }
            orders.push(swap_order);

            let mut variant = found.clone();
            let mut processed = BTreeSet::new();
            for (&rs, &rg) in &rsites {
                let Some(image) = auto[rs] else {
                    continue;
                };
                if image != rs && !processed.contains(&rs) {
                    processed.insert(rs);
                    processed.insert(image);
                    variant.swap_rgroups(rg, rsites[&image]);
                }
            }
            variants.push(variant);
        }

        trace!(
            rgroups = found.rgroup_count(),
            symmetric = variants.len(),
            "decomposition match stored"
        );
        self.matches.push(found);
        self.matches.extend(variants);
        Ok(())
    }
}

/// Split `molecule` into scaffold atoms and R-groups for one embedding.
///
/// R-groups are collected breadth first from the unmatched neighbours of
/// each scaffold atom. A bond between two matched atoms that is missing
/// from the scaffold becomes an R-group without atoms.
fn partition(
    scaffold: &Molecule,
    molecule: &Molecule,
    mapping: Vec<Option<usize>>,
    inv_mapping: Vec<Option<usize>>,
) -> Result<DecompositionMatch> {
    let end = molecule.atom_end();
    let is_scaffold = |v: usize| inv_mapping.get(v).copied().flatten().is_some();

    let mut roles = vec![AtomRole::Unvisited; end];
    let mut attachment_index = Vec::new();
    let mut attachment_order = Vec::new();

    for atom in scaffold.atom_indices() {
        let Some(start) = mapping.get(atom).copied().flatten() else {
            continue;
        };
        if roles[start] != AtomRole::Unvisited {
            continue;
        }

        for first in molecule.neighbors(start) {
            if is_scaffold(first) || matches!(roles[first], AtomRole::RGroup(_)) {
                continue;
            }

            let rg = attachment_index.len();
            let mut indexes = Vec::new();
            let mut orders = Vec::new();
            let mut queued = vec![false; end];
            let mut queue = VecDeque::from([first]);
            queued[first] = true;

            while let Some(cur) = queue.pop_front() {
                for nei in molecule.neighbors(cur) {
                    if matches!(roles[nei], AtomRole::RGroup(_)) || queued[nei] {
                        continue;
                    }
                    if is_scaffold(nei) {
                        indexes.push(cur);
                        orders.push(nei);
                    } else {
                        queued[nei] = true;
                        queue.push_back(nei);
                    }
                }
                roles[cur] = AtomRole::RGroup(rg);
            }

            attachment_index.push(indexes);
            attachment_order.push(orders);
        }
        roles[start] = AtomRole::Scaffold;
    }

    let mut scaffold_bonds = Vec::new();
    for e in molecule.bond_indices() {
        let Some((beg, end)) = molecule.bond_endpoints(e) else {
            continue;
        };
        let (Some(s1), Some(s2)) = (
            inv_mapping.get(beg).copied().flatten(),
            inv_mapping.get(end).copied().flatten(),
        ) else {
            continue;
        };
        if scaffold.find_bond(s1, s2).is_some() {
            scaffold_bonds.push(e);
        } else {
            attachment_index.push(vec![beg, end]);
            attachment_order.push(vec![end, beg]);
        }
    }

    let scaffold_atoms = molecule
        .atom_indices()
        .into_iter()
        .filter(|&v| is_scaffold(v))
        .collect();

    Ok(DecompositionMatch {
        roles,
        scaffold_atoms,
        scaffold_bonds,
        mapping,
        inv_mapping,
        attachment_index,
        attachment_order,
        ..DecompositionMatch::default()
    })
}

/// Add one R-site per R-group to `with_rsites`, bonded to the scaffold
/// atoms the R-group hangs from. Returns R-site atom to R-group position.
fn add_all_rsites(
    with_rsites: &mut Molecule,
    found: &DecompositionMatch,
) -> Result<BTreeMap<usize, usize>> {
    let mut rsites = BTreeMap::new();
    for (rg, orders) in found.attachment_order.iter().enumerate() {
        if orders.is_empty() {
            continue;
        }
        let rsite = with_rsites.add_atom(Atom::rsite(0));
        rsites.insert(rsite, rg);
        for &order in orders {
            let own = found
                .inv_mapping
                .get(order)
                .copied()
                .flatten()
                .ok_or(Error::UndefinedMapping)?;
            if with_rsites.find_bond(rsite, own).is_none() {
                with_rsites.add_bond(rsite, own, Bond::Single);
            }
        }
    }
    Ok(rsites)
}

/// Drop automorphisms of `sub` that would break the embedding `scaf_map`
/// of `sub` into `sup`. A matched atom may not be sent to an R-site, and
/// after relabelling every matched atom and bond must still match the
/// molecule atom or bond it covers.
pub(crate) fn refine_automorphisms(
    autos: &mut Vec<Permutation>,
    sub: &Molecule,
    sup: &Molecule,
    scaf_map: &[Option<usize>],
) -> Result<()> {
    let mapped = |v: usize| scaf_map.get(v).copied().flatten();
    let mut matcher = ScaffoldMatcher;
    let (g1, g2) = (sub.graph(), sup.graph());

    let mut kept = Vec::with_capacity(autos.len());
    'autos: for auto in autos.drain(..) {
        for v in sub.atom_indices() {
            if sub.is_rsite(v) {
                continue;
            }
            let Some(target) = mapped(v) else {
                continue;
            };
            let image = auto
                .get(v)
                .copied()
                .flatten()
                .ok_or(Error::UndefinedMapping)?;
            if sub.is_rsite(image) || !matcher.match_vertex(g1, g2, &[], image, target) {
                continue 'autos;
            }
        }

        for e in sub.bond_indices() {
            let Some((beg, end)) = sub.bond_endpoints(e) else {
                continue;
            };
            if sub.is_rsite(beg) || sub.is_rsite(end) {
                continue;
            }
            let (Some(mb), Some(me)) = (mapped(beg), mapped(end)) else {
                continue;
            };
            let target = sup.find_bond(mb, me).ok_or(Error::UndefinedMapping)?;
            let (Some(ab), Some(ae)) = (
                auto.get(beg).copied().flatten(),
                auto.get(end).copied().flatten(),
            ) else {
                return Err(Error::UndefinedMapping);
            };
            let own = sub.find_bond(ab, ae).ok_or(Error::UndefinedMapping)?;
            if !matcher.match_edge(g1, g2, own, target) {
                continue 'autos;
            }
        }
        kept.push(auto);
    }
    *autos = kept;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{embedding::EmbeddingEnumerator, molecule::Element};

    fn benzene() -> Molecule {
        let mut mol = Molecule::new();
        let atoms = (0..6)
            .map(|_| mol.add_atom(Atom::new(Element::Carbon)))
            .collect::<Vec<_>>();
        for i in 0..6 {
            mol.add_bond(atoms[i], atoms[(i + 1) % 6], Bond::Aromatic);
        }
        mol
    }

    fn xylene() -> Molecule {
        let mut mol = benzene();
        let a = mol.add_atom(Atom::new(Element::Carbon));
        let b = mol.add_atom(Atom::new(Element::Carbon));
        mol.add_bond(0, a, Bond::Single);
        mol.add_bond(3, b, Bond::Single);
        mol
    }

    fn collect(scaffold: &Molecule, molecule: &Molecule, all: bool) -> Vec<DecompositionMatch> {
        let mut collector = MatchCollector::new(scaffold, false, all);
        let mut failure = None;
        EmbeddingEnumerator::new(scaffold.graph(), molecule.graph(), ScaffoldMatcher).process(
            |map, inv| match collector.on_embedding(molecule, map, inv) {
                Ok(go_on) => go_on,
                Err(e) => {
                    failure = Some(e);
                    false
                }
            },
        );
        assert!(failure.is_none());
        collector.matches
    }

    #[test]
    fn partition_covers_every_atom_once() {
        let (scaffold, molecule) = (benzene(), xylene());
        let matches = collect(&scaffold, &molecule, false);
        let found = &matches[0];
        assert_eq!(found.scaffold_atoms(), &[0, 1, 2, 3, 4, 5]);
        assert_eq!(found.rgroup_count(), 2);
        assert_eq!(found.scaffold_bonds().len(), 6);
        assert!(found.roles().iter().all(|r| *r != AtomRole::Unvisited));
        let mut attachments = found.attachment_map();
        attachments.sort();
        assert_eq!(attachments, vec![vec![(0, 6)], vec![(3, 7)]]);
    }

    #[test]
    fn symmetric_rgroups_produce_swapped_variants() {
        let (scaffold, molecule) = (benzene(), xylene());
        let matches = collect(&scaffold, &molecule, false);
        // The para positions can be exchanged by a ring reflection.
        assert_eq!(matches.len(), 2);
        let mut swapped = matches[0].attachment_map();
        swapped.reverse();
        assert_eq!(matches[1].attachment_map(), swapped);
        let (AtomRole::RGroup(a), AtomRole::RGroup(b)) = (matches[0].roles()[6], matches[1].roles()[6])
        else {
            panic!("methyl carbon outside any R-group");
        };
        assert_ne!(a, b);
    }

    #[test]
    fn ring_closure_becomes_empty_rgroup() {
        let mut scaffold = Molecule::new();
        let a = (0..3)
            .map(|_| scaffold.add_atom(Atom::new(Element::Carbon)))
            .collect::<Vec<_>>();
        scaffold.add_bond(a[0], a[1], Bond::Single);
        scaffold.add_bond(a[1], a[2], Bond::Single);

        let mut molecule = scaffold.clone();
        molecule.add_bond(a[2], a[0], Bond::Single);

        let matches = collect(&scaffold, &molecule, false);
        let found = &matches[0];
        assert_eq!(found.rgroup_count(), 1);
        assert_eq!(found.attachment_map()[0].len(), 2);
    }

    #[test]
    fn repeated_coverage_is_skipped() {
        let (scaffold, molecule) = (benzene(), xylene());
        let all = collect(&scaffold, &molecule, true);
        // Twelve embeddings cover the same six atoms; only the first and
        // its symmetric variant survive.
        assert_eq!(all.len(), 2);
    }
}
