//! Scaffold/R-group decomposition.
//!
//! A [`Deconvolution`] holds one scaffold and a list of molecules. Each
//! molecule is embedded with the scaffold as query, split into scaffold
//! atoms and R-groups, and its R-groups are numbered consistently with the
//! molecules decomposed before it. R-group positions never seen before
//! extend the full scaffold with new R-sites.

mod fragments;
mod matches;
mod numbering;

use std::collections::BTreeMap;

use tracing::{debug, info, instrument, warn};

use crate::{
    aromatic::aromatize,
    embedding::EmbeddingEnumerator,
    error::{Error, Result},
    matching::ScaffoldMatcher,
    molecule::{Molecule, RGroup},
};

pub use matches::{AtomRole, DecompositionMatch};
pub use numbering::FullScaffold;

use matches::MatchCollector;

pub type Properties = BTreeMap<String, String>;

/// Knobs of a [`Deconvolution`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeconvolutionOptions {
    /// Write attachment points as `AP<n>` pseudo atoms instead of
    /// attachment point records.
    pub save_ap_bond_orders: bool,
    /// Skip molecules the scaffold does not embed in.
    pub ignore_errors: bool,
    /// Aromatize the scaffold and every molecule before matching.
    pub aromatize: bool,
    /// Score added per unit of decrease between neighbouring R-group
    /// indices when choosing among symmetric numberings.
    pub order_penalty: i64,
}

impl Default for DeconvolutionOptions {
    fn default() -> Self {
        Self {
            save_ap_bond_orders: false,
            ignore_errors: false,
            aromatize: true,
            order_penalty: 100,
        }
    }
}

/// A retrieved molecule together with the properties of its item.
#[derive(Debug, Clone)]
pub struct Decomposed {
    pub molecule: Molecule,
    pub properties: Properties,
}

/// One molecule submitted for decomposition.
#[derive(Debug, Clone, Default)]
pub struct DeconvolutionItem {
    index: usize,
    molecule: Molecule,
    properties: Properties,
    matches: Vec<DecompositionMatch>,
    detached: bool,
}

impl DeconvolutionItem {
    /// The caller supplied index, used in error messages.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn molecule(&self) -> &Molecule {
        &self.molecule
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn matches(&self) -> &[DecompositionMatch] {
        &self.matches
    }
}

#[derive(Debug, Clone, Default)]
pub struct Deconvolution {
    options: DeconvolutionOptions,
    scaffold: Molecule,
    full: FullScaffold,
    items: Vec<DeconvolutionItem>,
}

impl Deconvolution {
    pub fn new(options: DeconvolutionOptions) -> Self {
        Self {
            options,
            full: FullScaffold {
                order_penalty: options.order_penalty,
                ..FullScaffold::default()
            },
            ..Self::default()
        }
    }

    pub fn options(&self) -> &DeconvolutionOptions {
        &self.options
    }

    /// Replace the scaffold and reset the full scaffold to it.
    ///
    /// A scaffold that already carries R-sites is taken as user defined:
    /// its R-sites are the only attachment positions, and every other atom
    /// must be matched by an atom with as many heavy neighbours.
    pub fn set_scaffold(&mut self, scaffold: &Molecule) {
        let mut scaffold = scaffold.clone_keep_indices();
        if self.options.aromatize {
            aromatize(&mut scaffold);
        }

        let user_defined = !scaffold.rsites().is_empty();
        if user_defined {
            for v in scaffold.atom_indices() {
                let heavy = scaffold.heavy_degree(v);
                if let Some(atom) = scaffold.atom_mut(v) {
                    if atom.element().is_some() {
                        atom.set_substituents(Some(heavy));
                    }
                }
            }
        }

        self.full = FullScaffold {
            molecule: scaffold.clone_keep_indices(),
            user_defined,
            order_penalty: self.options.order_penalty,
        };
        self.scaffold = scaffold;
        debug!(
            atoms = self.scaffold.atom_count(),
            user_defined, "scaffold set"
        );
    }

    pub fn scaffold_molecule(&self) -> &Molecule {
        &self.scaffold
    }

    /// Queue `molecule` for decomposition. Returns its position.
    pub fn add_molecule(
        &mut self,
        molecule: Molecule,
        properties: Properties,
        index: usize,
    ) -> usize {
        self.items.push(DeconvolutionItem {
            index,
            molecule,
            properties,
            ..DeconvolutionItem::default()
        });
        self.items.len() - 1
    }

    pub fn items(&self) -> &[DeconvolutionItem] {
        &self.items
    }

    pub fn item(&self, item: usize) -> Result<&DeconvolutionItem> {
        self.items.get(item).ok_or(Error::UnknownItem(item))
    }

    /// The scaffold extended with every R-site assigned so far.
    pub fn decomposed_scaffold(&self) -> &Molecule {
        &self.full.molecule
    }

    pub fn full_scaffold(&self) -> &FullScaffold {
        &self.full
    }

    /// Set `scaffold` and decompose every queued molecule with its first
    /// match, growing the full scaffold.
    pub fn make_rgroups(&mut self, scaffold: &Molecule) -> Result<()> {
        self.set_scaffold(scaffold);
        for item in 0..self.items.len() {
            if self.items[item].detached {
                continue;
            }
            self.make_rgroup(item, false, true)?;
        }
        info!(
            molecules = self.items.len(),
            rsites = self.full.molecule.rsites().len(),
            "decomposition finished"
        );
        Ok(())
    }

    /// Decompose one queued molecule. With `all_matches` every distinct
    /// scaffold coverage is kept instead of the first one; with
    /// `change_scaffold` new R-group positions are added to the full
    /// scaffold.
    #[instrument(level = "trace", skip(self))]
    pub fn make_rgroup(
        &mut self,
        item: usize,
        all_matches: bool,
        change_scaffold: bool,
    ) -> Result<()> {
        let Self {
            options,
            scaffold,
            full,
            items,
        } = self;
        let entry = items.get_mut(item).ok_or(Error::UnknownItem(item))?;

        if full.molecule.atom_count() == 0 {
            return Err(Error::EmptyScaffold);
        }
        entry.matches.clear();
        if entry.molecule.atom_count() == 0 {
            warn!(index = entry.index, "empty molecule skipped");
            return Ok(());
        }
        if options.aromatize {
            aromatize(&mut entry.molecule);
        }

        let mut collector = MatchCollector::new(scaffold, full.user_defined, all_matches);
        let mut failure = None;
        let molecule = &entry.molecule;
        EmbeddingEnumerator::new(scaffold.graph(), molecule.graph(), ScaffoldMatcher).process(
            |map, inv| match collector.on_embedding(molecule, map, inv) {
                Ok(go_on) => go_on,
                Err(e) => {
                    failure = Some(e);
                    false
                }
            },
        );
        if let Some(e) = failure {
            return Err(e);
        }

        if collector.matches.is_empty() {
            if options.ignore_errors {
                warn!(index = entry.index, "no embeddings, molecule skipped");
                return Ok(());
            }
            return Err(Error::NoEmbeddings);
        }

        for mut found in collector.matches {
            found.molecule = entry.molecule.clone();
            fragments::build_rgroups(
                full,
                &mut found,
                options.save_ap_bond_orders,
                change_scaffold,
            )?;
            found.complete = change_scaffold;

            let (mut scaffold_molecule, _) = found
                .molecule
                .edge_submolecule(&found.scaffold_atoms, &found.scaffold_bonds);
            scaffold_molecule.unhighlight_all();
            found.scaffold_molecule = scaffold_molecule;
            highlight_scaffold(scaffold, &mut found);
            entry.matches.push(found);
        }

        info!(
            index = entry.index,
            formula = %entry.molecule.formula(),
            matches = entry.matches.len(),
            rgroups = entry.matches[0].rgroup_count(),
            "molecule decomposed"
        );
        Ok(())
    }

    /// Decompose `molecule` with its first match without touching the full
    /// scaffold. The item is kept for retrieval but takes no part in
    /// [`Deconvolution::make_rgroups`]. Returns its position.
    pub fn decompose_molecule(&mut self, molecule: Molecule) -> Result<usize> {
        let item = self.items.len();
        self.items.push(DeconvolutionItem {
            index: item,
            molecule,
            detached: true,
            ..DeconvolutionItem::default()
        });
        self.make_rgroup(item, false, false)?;
        Ok(item)
    }

    /// Every distinct match of a queued molecule, leaving the full scaffold
    /// unchanged.
    pub fn iterate_decompositions(&mut self, item: usize) -> Result<&[DecompositionMatch]> {
        self.make_rgroup(item, true, false)?;
        Ok(&self.item(item)?.matches)
    }

    /// Commit one match of an item into the full scaffold and renumber its
    /// R-groups against it.
    pub fn add_decomposition(&mut self, item: usize, index: usize) -> Result<()> {
        let Self { options, full, items, .. } = self;
        let entry = items.get_mut(item).ok_or(Error::UnknownItem(item))?;
        let found = entry.matches.get_mut(index).ok_or(Error::UnknownMatch(index))?;
        fragments::build_rgroups(full, found, options.save_ap_bond_orders, true)?;
        found.complete = true;
        Ok(())
    }

    /// The matched scaffold part of an item's first match.
    pub fn scaffold(&mut self, item: usize) -> Result<Molecule> {
        Ok(self.completed(item)?.scaffold_molecule.clone())
    }

    /// The item's molecule with the scaffold highlighted.
    pub fn highlighted(&mut self, item: usize) -> Result<Decomposed> {
        let molecule = self.completed(item)?.molecule.clone();
        Ok(Decomposed {
            molecule,
            properties: self.items[item].properties.clone(),
        })
    }

    /// The R-groups of an item's first match by global index.
    pub fn substituents(&mut self, item: usize) -> Result<BTreeMap<u32, RGroup>> {
        Ok(self.completed(item)?.rgroup_molecule.rgroups().clone())
    }

    /// The scaffold part with one R-site per R-group and the R-group table.
    pub fn with_rgroups(&mut self, item: usize) -> Result<Decomposed> {
        let molecule = self.completed(item)?.rgroup_molecule.clone();
        Ok(Decomposed {
            molecule,
            properties: self.items[item].properties.clone(),
        })
    }

    /// The first match of an item, committed to the full scaffold once.
    fn completed(&mut self, item: usize) -> Result<&DecompositionMatch> {
        let Self { options, full, items, .. } = self;
        let entry = items.get_mut(item).ok_or(Error::UnknownItem(item))?;
        let index = entry.index;
        let found = entry
            .matches
            .first_mut()
            .ok_or(Error::NoEmbeddingsForMolecule(index))?;
        if !found.complete {
            fragments::build_rgroups(full, found, options.save_ap_bond_orders, true)?;
            found.complete = true;
        }
        Ok(found)
    }
}

/// Highlight the image of every scaffold atom and bond.
fn highlight_scaffold(scaffold: &Molecule, found: &mut DecompositionMatch) {
    let mapped = |v: usize| found.mapping.get(v).copied().flatten();
    let mut atoms = Vec::new();
    let mut bonds = Vec::new();
    for v in scaffold.atom_indices() {
        atoms.extend(mapped(v));
    }
    for e in scaffold.bond_indices() {
        let Some((u, v)) = scaffold.bond_endpoints(e) else {
            continue;
        };
        if let (Some(mu), Some(mv)) = (mapped(u), mapped(v)) {
            bonds.extend(found.molecule.find_bond(mu, mv));
        }
    }
    for v in atoms {
        found.molecule.highlight_atom(v);
    }
    for e in bonds {
        found.molecule.highlight_bond(e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::molecule::{Atom, AtomKind, Bond, Element};

    fn ring(mol: &mut Molecule) -> Vec<usize> {
        let atoms = (0..6)
            .map(|_| mol.add_atom(Atom::new(Element::Carbon)))
            .collect::<Vec<_>>();
        for i in 0..6 {
            let bond = if i % 2 == 0 { Bond::Double } else { Bond::Single };
            mol.add_bond(atoms[i], atoms[(i + 1) % 6], bond);
        }
        atoms
    }

    fn benzene() -> Molecule {
        let mut mol = Molecule::new();
        ring(&mut mol);
        mol
    }

    fn substituted(at: usize, element: Element) -> Molecule {
        let mut mol = Molecule::new();
        let atoms = ring(&mut mol);
        let x = mol.add_atom(Atom::new(element));
        mol.add_bond(atoms[at], x, Bond::Single);
        mol
    }

    fn fragment_elements(groups: &BTreeMap<u32, RGroup>) -> Vec<(u32, Vec<Option<Element>>)> {
        groups
            .iter()
            .map(|(&idx, group)| {
                let elements = group.fragments()[0]
                    .atom_indices()
                    .into_iter()
                    .map(|v| group.fragments()[0].atom(v).and_then(Atom::element))
                    .collect();
                (idx, elements)
            })
            .collect()
    }

    #[test]
    fn toluene_and_aniline_share_one_rsite() {
        let mut deco = Deconvolution::new(DeconvolutionOptions::default());
        deco.add_molecule(substituted(0, Element::Carbon), Properties::new(), 0);
        deco.add_molecule(substituted(3, Element::Nitrogen), Properties::new(), 1);
        deco.make_rgroups(&benzene()).unwrap();

        let full = deco.decomposed_scaffold();
        assert_eq!(full.rsites().len(), 1);
        assert_eq!(full.atom_count(), 7);

        assert_eq!(deco.scaffold(0).unwrap().atom_count(), 6);
        assert_eq!(
            fragment_elements(&deco.substituents(0).unwrap()),
            vec![(1, vec![Some(Element::Carbon)])]
        );
        assert_eq!(
            fragment_elements(&deco.substituents(1).unwrap()),
            vec![(1, vec![Some(Element::Nitrogen)])]
        );
        assert_eq!(deco.decomposed_scaffold().rsites().len(), 1);
    }

    #[test]
    fn distinct_positions_get_distinct_indices() {
        let mut xylene = substituted(0, Element::Carbon);
        let methyl = xylene.add_atom(Atom::new(Element::Carbon));
        xylene.add_bond(1, methyl, Bond::Single);

        let mut deco = Deconvolution::new(DeconvolutionOptions::default());
        deco.add_molecule(xylene, Properties::new(), 0);
        deco.add_molecule(substituted(2, Element::Oxygen), Properties::new(), 1);
        deco.make_rgroups(&benzene()).unwrap();

        assert_eq!(deco.decomposed_scaffold().rsites().len(), 2);
        let indices = deco.substituents(0).unwrap().into_keys().collect::<Vec<_>>();
        assert_eq!(indices, vec![1, 2]);
        assert_eq!(deco.substituents(1).unwrap().len(), 1);
    }

    #[test]
    fn repeated_decomposition_is_stable() {
        let mut deco = Deconvolution::new(DeconvolutionOptions::default());
        deco.add_molecule(substituted(4, Element::Chlorine), Properties::new(), 0);
        deco.make_rgroups(&benzene()).unwrap();
        let first = deco.substituents(0).unwrap().into_keys().collect::<Vec<_>>();

        let again = deco.decompose_molecule(substituted(4, Element::Chlorine)).unwrap();
        let second = deco.substituents(again).unwrap().into_keys().collect::<Vec<_>>();
        assert_eq!(first, second);
        assert_eq!(deco.decomposed_scaffold().rsites().len(), 1);
    }

    #[test]
    fn missing_scaffold_follows_error_policy() {
        let mut propane = Molecule::new();
        let a = (0..3)
            .map(|_| propane.add_atom(Atom::new(Element::Carbon)))
            .collect::<Vec<_>>();
        propane.add_bond(a[0], a[1], Bond::Single);
        propane.add_bond(a[1], a[2], Bond::Single);

        let mut strict = Deconvolution::new(DeconvolutionOptions::default());
        strict.add_molecule(propane.clone(), Properties::new(), 7);
        assert_eq!(strict.make_rgroups(&benzene()), Err(Error::NoEmbeddings));

        let mut lenient = Deconvolution::new(DeconvolutionOptions {
            ignore_errors: true,
            ..DeconvolutionOptions::default()
        });
        lenient.add_molecule(propane, Properties::new(), 7);
        lenient.make_rgroups(&benzene()).unwrap();
        assert!(matches!(
            lenient.scaffold(0),
            Err(Error::NoEmbeddingsForMolecule(7))
        ));
    }

    #[test]
    fn empty_scaffold_is_rejected() {
        let mut deco = Deconvolution::new(DeconvolutionOptions::default());
        deco.add_molecule(benzene(), Properties::new(), 0);
        assert_eq!(deco.make_rgroups(&Molecule::new()), Err(Error::EmptyScaffold));
    }

    #[test]
    fn highlighted_molecule_carries_properties() {
        let mut deco = Deconvolution::new(DeconvolutionOptions::default());
        let props = Properties::from([("name".to_string(), "phenol".to_string())]);
        deco.add_molecule(substituted(0, Element::Oxygen), props.clone(), 0);
        deco.make_rgroups(&benzene()).unwrap();

        let highlighted = deco.highlighted(0).unwrap();
        assert_eq!(highlighted.properties, props);
        assert_eq!(highlighted.molecule.highlighted_atoms().len(), 6);
        assert_eq!(highlighted.molecule.highlighted_bonds().len(), 6);
    }

    #[test]
    fn attachment_points_as_pseudo_atoms() {
        let mut deco = Deconvolution::new(DeconvolutionOptions {
            save_ap_bond_orders: true,
            ..DeconvolutionOptions::default()
        });
        deco.add_molecule(substituted(0, Element::Nitrogen), Properties::new(), 0);
        deco.make_rgroups(&benzene()).unwrap();

        let groups = deco.substituents(0).unwrap();
        let fragment = &groups[&1].fragments()[0];
        assert_eq!(fragment.atom_count(), 2);
        assert_eq!(fragment.bond_count(), 1);
        assert!(fragment
            .atom_indices()
            .into_iter()
            .any(|v| fragment.atom(v).map(Atom::kind) == Some(&AtomKind::Pseudo("AP1".into()))));
        assert!(fragment.attachment_points().is_empty());
    }

    #[test]
    fn attachment_points_as_records() {
        let mut deco = Deconvolution::new(DeconvolutionOptions::default());
        deco.add_molecule(substituted(0, Element::Nitrogen), Properties::new(), 0);
        deco.make_rgroups(&benzene()).unwrap();

        let with_rgroups = deco.with_rgroups(0).unwrap().molecule;
        let rsite = with_rgroups.rsites()[0];
        assert_eq!(with_rgroups.rsite_attachment_order(rsite).len(), 1);
        let fragment = &with_rgroups.rgroups()[&1].fragments()[0];
        assert_eq!(fragment.attachment_points(), &[(1, 0)]);
    }

    #[test]
    fn user_defined_scaffold_keeps_its_rsites() {
        let mut query = benzene();
        let r = query.add_atom(Atom::rsite(5));
        query.add_bond(0, r, Bond::Single);

        let mut deco = Deconvolution::new(DeconvolutionOptions::default());
        deco.add_molecule(substituted(0, Element::Fluorine), Properties::new(), 0);
        deco.make_rgroups(&query).unwrap();

        assert!(deco.full_scaffold().is_user_defined());
        assert_eq!(deco.decomposed_scaffold().rsites(), vec![r]);
        let indices = deco.substituents(0).unwrap().into_keys().collect::<Vec<_>>();
        assert_eq!(indices, vec![5]);
    }

    #[test]
    fn iterated_matches_leave_scaffold_alone() {
        let mut deco = Deconvolution::new(DeconvolutionOptions::default());
        deco.set_scaffold(&benzene());
        let item = deco.add_molecule(substituted(0, Element::Carbon), Properties::new(), 0);
        let count = deco.iterate_decompositions(item).unwrap().len();
        assert_eq!(count, 1);
        assert!(deco.decomposed_scaffold().rsites().is_empty());

        deco.add_decomposition(item, 0).unwrap();
        assert_eq!(deco.decomposed_scaffold().rsites().len(), 1);
        let found = &deco.items()[item].matches()[0];
        assert!(found.complete);
        assert_eq!(found.rgroup_molecule().rsites().len(), 1);
        assert_eq!(deco.add_decomposition(item, 3), Err(Error::UnknownMatch(3)));
    }

    #[test]
    fn grown_matches_are_committed_once() {
        let mut deco = Deconvolution::new(DeconvolutionOptions::default());
        deco.add_molecule(substituted(0, Element::Carbon), Properties::new(), 0);
        deco.make_rgroups(&benzene()).unwrap();
        assert!(deco.items()[0].matches()[0].complete);

        let item = deco.decompose_molecule(substituted(0, Element::Oxygen)).unwrap();
        assert!(!deco.items()[item].matches()[0].complete);
        let keys = deco.substituents(item).unwrap().into_keys().collect::<Vec<_>>();
        assert_eq!(keys, vec![1]);
        assert!(deco.items()[item].matches()[0].complete);
        assert_eq!(deco.decomposed_scaffold().rsites().len(), 1);
    }
}
