//! R-group molecules built from a numbered match.

use std::collections::BTreeMap;

use crate::{
    error::{Error, Result},
    molecule::Atom,
};

use super::{
    matches::{AtomRole, DecompositionMatch},
    numbering::FullScaffold,
};

/// Build the scaffold-with-R-sites molecule of `found` and store each
/// R-group fragment under its global index.
///
/// Attachment points are either recorded as `(order, atom)` pairs on the
/// fragment together with R-site attachment orders, or, with
/// `save_ap_bond_orders`, written as `AP<n>` pseudo atoms bonded to the
/// fragment with the bond they replace.
pub(crate) fn build_rgroups(
    full: &mut FullScaffold,
    found: &mut DecompositionMatch,
    save_ap_bond_orders: bool,
    extend: bool,
) -> Result<()> {
    let molecule = &found.molecule;
    let (mut rgroup_mol, inv_scaffold) =
        molecule.edge_submolecule(&found.scaffold_atoms, &found.scaffold_bonds);
    let indices = full.assign(found, molecule, extend)?;

    for (rg, &rg_index) in indices.iter().enumerate() {
        let indexes = &found.attachment_index[rg];
        let orders = &found.attachment_order[rg];
        let Some(&first) = indexes.first() else {
            continue;
        };

        let position = molecule.atom(first).map(Atom::position).unwrap_or_default();
        let rsite = rgroup_mol.add_atom(Atom::rsite(rg_index).with_position(position));

        let mut order_values = BTreeMap::new();
        for (&index, &order) in indexes.iter().zip(orders) {
            let next = order_values.len() + 1;
            let value = *order_values.entry(order).or_insert(next);
            let own = inv_scaffold
                .get(order)
                .copied()
                .flatten()
                .ok_or(Error::UndefinedMapping)?;
            if rgroup_mol.find_bond(rsite, own).is_none() {
                let bond = molecule
                    .find_bond(order, index)
                    .and_then(|e| molecule.bond(e))
                    .ok_or(Error::MissingScaffoldEdge)?;
                rgroup_mol.add_bond(rsite, own, bond);
            }
            if !save_ap_bond_orders {
                rgroup_mol.set_rsite_attachment_order(rsite, own, value - 1);
            }
        }

        let (mut fragment, to_fragment) =
            molecule.induced_submolecule(|v| found.roles.get(v) == Some(&AtomRole::RGroup(rg)));

        let mut pending = BTreeMap::new();
        for (&index, &order) in indexes.iter().zip(orders) {
            let inner = to_fragment.get(index).copied().flatten();
            let value = order_values.get(&order).copied().unwrap_or_default();
            let edge = molecule
                .find_bond(order, index)
                .ok_or(Error::MissingFragmentEdge)?;
            let bond = molecule.bond(edge).ok_or(Error::MissingFragmentEdge)?;

            if save_ap_bond_orders {
                let ap = fragment.add_atom(Atom::pseudo(format!("AP{value}")));
                match inner {
                    Some(inner) => {
                        fragment.add_bond(ap, inner, bond);
                    }
                    // Ring closure: both ends are pseudo atoms sharing one bond.
                    None => match pending.get(&edge) {
                        Some(&other) => {
                            fragment.add_bond(ap, other, bond);
                        }
                        None => {
                            pending.insert(edge, ap);
                        }
                    },
                }
            } else if let Some(inner) = inner {
                fragment.add_attachment_point(value, inner);
            }
        }

        rgroup_mol.rgroup_mut(rg_index).add_fragment(fragment);
    }

    found.rgroup_molecule = rgroup_mol;
    Ok(())
}
