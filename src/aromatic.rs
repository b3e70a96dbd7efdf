//! Kekulé ring aromatization.
//!
//! Six-membered rings whose bonds alternate between single and double are
//! rewritten with [`Bond::Aromatic`]. Bonds that are already aromatic count
//! as either kind, so fused systems are picked up over repeated passes.

use std::collections::BTreeSet;

use tracing::trace;

use crate::molecule::{Bond, Molecule};

const RING_SIZE: usize = 6;

/// Aromatize every alternating six-membered ring of `mol`. Returns the
/// number of bonds changed.
pub fn aromatize(mol: &mut Molecule) -> usize {
    let mut changed = 0;
    loop {
        let mut pass = 0;
        for ring in six_rings(mol) {
            if !alternates(mol, &ring) {
                continue;
            }
            for &e in &ring {
                if mol.bond(e) != Some(Bond::Aromatic) {
                    mol.set_bond(e, Bond::Aromatic);
                    pass += 1;
                }
            }
        }
        if pass == 0 {
            break;
        }
        changed += pass;
    }
    trace!(changed, "aromatized");
    changed
}

/// Bonds of every simple six-membered ring, in ring order.
fn six_rings(mol: &Molecule) -> Vec<Vec<usize>> {
    let mut seen = BTreeSet::new();
    let mut rings = Vec::new();
    for start in mol.atom_indices() {
        let mut path = vec![start];
        extend(mol, start, &mut path, &mut seen, &mut rings);
    }
    rings
}

/// Depth-first walk over atoms greater than `start`, closing back onto it.
fn extend(
    mol: &Molecule,
    start: usize,
    path: &mut Vec<usize>,
    seen: &mut BTreeSet<Vec<usize>>,
    rings: &mut Vec<Vec<usize>>,
) {
    let Some(&last) = path.last() else {
        return;
    };
    for next in mol.neighbors(last) {
        if path.len() == RING_SIZE {
            if next != start {
                continue;
            }
            let bonds = ring_bonds(mol, path);
            let mut key = bonds.clone();
            key.sort_unstable();
            if bonds.len() == RING_SIZE && seen.insert(key) {
                rings.push(bonds);
            }
        } else if next > start && !path.contains(&next) {
            path.push(next);
            extend(mol, start, path, seen, rings);
            path.pop();
        }
    }
}

fn ring_bonds(mol: &Molecule, path: &[usize]) -> Vec<usize> {
    (0..path.len())
        .filter_map(|i| mol.find_bond(path[i], path[(i + 1) % path.len()]))
        .collect()
}

/// The ring bonds can be read as alternating single and double bonds.
fn alternates(mol: &Molecule, ring: &[usize]) -> bool {
    let fits = |parity: usize| {
        ring.iter().enumerate().all(|(i, &e)| match mol.bond(e) {
            Some(Bond::Aromatic) => true,
            Some(Bond::Single) => i % 2 != parity,
            Some(Bond::Double) => i % 2 == parity,
            _ => false,
        })
    };
    let all_aromatic = ring.iter().all(|&e| mol.bond(e) == Some(Bond::Aromatic));
    !all_aromatic && (fits(0) || fits(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::molecule::{Atom, Element};

    fn kekule_ring(mol: &mut Molecule, atoms: &[usize]) {
        for i in 0..atoms.len() {
            let bond = if i % 2 == 0 { Bond::Double } else { Bond::Single };
            mol.add_bond(atoms[i], atoms[(i + 1) % atoms.len()], bond);
        }
    }

    #[test]
    fn benzene_becomes_aromatic() {
        let mut mol = Molecule::new();
        let atoms = (0..6)
            .map(|_| mol.add_atom(Atom::new(Element::Carbon)))
            .collect::<Vec<_>>();
        kekule_ring(&mut mol, &atoms);
        let methyl = mol.add_atom(Atom::new(Element::Carbon));
        let tail = mol.add_bond(atoms[0], methyl, Bond::Single);

        assert_eq!(aromatize(&mut mol), 6);
        assert_eq!(mol.bond(tail), Some(Bond::Single));
        assert!(mol
            .bond_indices()
            .into_iter()
            .filter(|&e| e != tail)
            .all(|e| mol.bond(e) == Some(Bond::Aromatic)));
        assert_eq!(aromatize(&mut mol), 0);
    }

    #[test]
    fn cyclohexane_is_untouched() {
        let mut mol = Molecule::new();
        let atoms = (0..6)
            .map(|_| mol.add_atom(Atom::new(Element::Carbon)))
            .collect::<Vec<_>>();
        for i in 0..6 {
            mol.add_bond(atoms[i], atoms[(i + 1) % 6], Bond::Single);
        }
        assert_eq!(aromatize(&mut mol), 0);
    }

    #[test]
    fn naphthalene_is_fully_aromatized() {
        // Kekulé form with the shared bond double.
        let mut mol = Molecule::new();
        let a = (0..10)
            .map(|_| mol.add_atom(Atom::new(Element::Carbon)))
            .collect::<Vec<_>>();
        let bonds = [
            (0, 1, Bond::Double),
            (1, 2, Bond::Single),
            (2, 3, Bond::Double),
            (3, 4, Bond::Single),
            (4, 5, Bond::Double),
            (5, 0, Bond::Single),
            (4, 6, Bond::Single),
            (6, 7, Bond::Double),
            (7, 8, Bond::Single),
            (8, 9, Bond::Double),
            (9, 5, Bond::Single),
        ];
        for (u, v, b) in bonds {
            mol.add_bond(a[u], a[v], b);
        }
        assert_eq!(aromatize(&mut mol), 11);
    }
}
