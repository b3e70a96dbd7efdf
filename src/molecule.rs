//! Graph-theoretic representation of a molecule.
//!
//! Molecules are stable undirected graphs with [`Atom`]s as nodes and
//! [`Bond`]s as edges. Besides plain elements an atom may be an R-site, a
//! labelled pseudo atom, or an "any atom" query placeholder, so the same type
//! serves both as a decomposition target and as a scaffold query. A molecule
//! also carries the R-group table and attachment metadata produced by
//! decomposition.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::Display,
    str::FromStr,
};

use petgraph::visit::NodeIndexable;
use itertools::Itertools;

use crate::graph::{edge, edge_subgraph, induced_subgraph, node, UGraph};

pub type MGraph = UGraph<Atom, Bond>;

/// Thrown by [`Element::from_str`] if the string does not represent a valid
/// chemical element.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ParseElementError;

macro_rules! periodic_table {
    ( $(($element:ident, $name:literal),)* ) => {
        #[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        /// Represents a chemical element.
        pub enum Element {
            $( $element, )*
        }

        impl Display for Element {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match &self {
                    $( Element::$element => write!(f, "{}", $name), )*
                }
            }
        }

        impl FromStr for Element {
            type Err = ParseElementError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $name => Ok(Element::$element), )*
                    _ => Err(ParseElementError),
                }
            }
        }
    };
}

periodic_table!(
    (Hydrogen, "H"),
    (Helium, "He"),
    (Lithium, "Li"),
    (Beryllium, "Be"),
    (Boron, "B"),
    (Carbon, "C"),
    (Nitrogen, "N"),
    (Oxygen, "O"),
    (Fluorine, "F"),
    (Neon, "Ne"),
    (Sodium, "Na"),
    (Magnesium, "Mg"),
    (Aluminum, "Al"),
    (Silicon, "Si"),
    (Phosphorus, "P"),
    (Sulfur, "S"),
    (Chlorine, "Cl"),
    (Argon, "Ar"),
    (Potassium, "K"),
    (Calcium, "Ca"),
    (Scandium, "Sc"),
    (Titanium, "Ti"),
    (Vanadium, "V"),
    (Chromium, "Cr"),
    (Manganese, "Mn"),
    (Iron, "Fe"),
    (Cobalt, "Co"),
    (Nickel, "Ni"),
    (Copper, "Cu"),
    (Zinc, "Zn"),
    (Gallium, "Ga"),
    (Germanium, "Ge"),
    (Arsenic, "As"),
    (Selenium, "Se"),
    (Bromine, "Br"),
    (Krypton, "Kr"),
    (Rubidium, "Rb"),
    (Strontium, "Sr"),
    (Yttrium, "Y"),
    (Zirconium, "Zr"),
    (Niobium, "Nb"),
    (Molybdenum, "Mo"),
    (Technetium, "Tc"),
    (Ruthenium, "Ru"),
    (Rhodium, "Rh"),
    (Palladium, "Pd"),
    (Silver, "Ag"),
    (Cadmium, "Cd"),
    (Indium, "In"),
    (Tin, "Sn"),
    (Antimony, "Sb"),
    (Tellurium, "Te"),
    (Iodine, "I"),
    (Xenon, "Xe"),
    (Cesium, "Cs"),
    (Barium, "Ba"),
    (Lanthanum, "La"),
    (Cerium, "Ce"),
    (Praseodymium, "Pr"),
    (Neodymium, "Nd"),
    (Promethium, "Pm"),
    (Samarium, "Sm"),
    (Europium, "Eu"),
    (Gadolinium, "Gd"),
    (Terbium, "Tb"),
    (Dysprosium, "Dy"),
    (Holmium, "Ho"),
    (Erbium, "Er"),
    (Thulium, "Tm"),
    (Ytterbium, "Yb"),
    (Lutetium, "Lu"),
    (Hafnium, "Hf"),
    (Tantalum, "Ta"),
    (Wolfram, "W"),
    (Rhenium, "Re"),
    (Osmium, "Os"),
    (Iridium, "Ir"),
    (Platinum, "Pt"),
    (Gold, "Au"),
    (Mercury, "Hg"),
    (Thallium, "Tl"),
    (Lead, "Pb"),
    (Bismuth, "Bi"),
    (Polonium, "Po"),
    (Astatine, "At"),
    (Radon, "Rn"),
    (Francium, "Fr"),
    (Radium, "Ra"),
    (Actinium, "Ac"),
    (Thorium, "Th"),
    (Protactinium, "Pa"),
    (Uranium, "U"),
    (Neptunium, "Np"),
    (Plutonium, "Pu"),
    (Americium, "Am"),
    (Curium, "Cm"),
    (Berkelium, "Bk"),
    (Californium, "Cf"),
    (Einsteinium, "Es"),
    (Fermium, "Fm"),
    (Mendelevium, "Md"),
    (Nobelium, "No"),
    (Lawrencium, "Lr"),
    (Rutherfordium, "Rf"),
    (Dubnium, "Db"),
    (Seaborgium, "Sg"),
    (Bohrium, "Bh"),
    (Hassium, "Hs"),
    (Meitnerium, "Mt"),
    (Darmstadtium, "Ds"),
    (Roentgenium, "Rg"),
    (Copernicium, "Cn"),
    (Nihonium, "Nh"),
    (Flerovium, "Fl"),
    (Moscovium, "Mc"),
    (Livermorium, "Lv"),
    (Tennessine, "Ts"),
    (Oganesson, "Og"),
);

/// What an [`Atom`] stands for.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AtomKind {
    Element(Element),
    /// R-site placeholder carrying its allowed R-group index; `0` means no
    /// R-group has been assigned yet.
    RSite(u32),
    /// A labelled pseudo atom such as an attachment point marker.
    Pseudo(String),
    /// Query atom matching any target atom.
    Any,
}

/// The nodes of a [`Molecule`] graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    kind: AtomKind,
    position: [f32; 3],
    substituents: Option<usize>,
}

impl Atom {
    /// Construct an [`Atom`] of type `element` at the origin.
    pub fn new(element: Element) -> Self {
        Self::from_kind(AtomKind::Element(element))
    }

    pub fn rsite(allowed: u32) -> Self {
        Self::from_kind(AtomKind::RSite(allowed))
    }

    pub fn pseudo(label: impl Into<String>) -> Self {
        Self::from_kind(AtomKind::Pseudo(label.into()))
    }

    pub fn from_kind(kind: AtomKind) -> Self {
        Self {
            kind,
            position: [0.0; 3],
            substituents: None,
        }
    }

    pub fn with_position(mut self, position: [f32; 3]) -> Self {
        self.position = position;
        self
    }

    pub fn kind(&self) -> &AtomKind {
        &self.kind
    }

    /// Return this [`Atom`]'s element, if it is a plain element.
    pub fn element(&self) -> Option<Element> {
        match self.kind {
            AtomKind::Element(e) => Some(e),
            _ => None,
        }
    }

    pub fn position(&self) -> [f32; 3] {
        self.position
    }

    pub fn is_rsite(&self) -> bool {
        matches!(self.kind, AtomKind::RSite(_))
    }

    pub fn is_hydrogen(&self) -> bool {
        self.element() == Some(Element::Hydrogen)
    }

    /// Allowed R-group index of an R-site.
    pub fn rsite_index(&self) -> Option<u32> {
        match self.kind {
            AtomKind::RSite(idx) => Some(idx),
            _ => None,
        }
    }

    pub fn set_rsite_index(&mut self, idx: u32) {
        self.kind = AtomKind::RSite(idx);
    }

    /// Required number of non-hydrogen neighbours of a matched target atom.
    pub fn substituents(&self) -> Option<usize> {
        self.substituents
    }

    pub fn set_substituents(&mut self, count: Option<usize>) {
        self.substituents = count;
    }

    /// Symbol used in molfiles and formulas.
    pub fn symbol(&self) -> String {
        match &self.kind {
            AtomKind::Element(e) => e.to_string(),
            AtomKind::RSite(_) => "R#".to_string(),
            AtomKind::Pseudo(label) => label.clone(),
            AtomKind::Any => "A".to_string(),
        }
    }
}

/// The edges of a [`Molecule`] graph.
///
/// Aromatic rings may be stored either as alternating single and double bonds
/// or with the aromatic bond type; see [`crate::aromatic::aromatize`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Bond {
    Single,
    Double,
    Triple,
    Aromatic,
}

impl Bond {
    /// Bond type as written in a molfile bond block.
    pub fn order(&self) -> usize {
        match self {
            Bond::Single => 1,
            Bond::Double => 2,
            Bond::Triple => 3,
            Bond::Aromatic => 4,
        }
    }
}

/// Thrown by [`Bond::try_from`] when given anything other than 1 to 4.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ParseBondError;

impl TryFrom<usize> for Bond {
    type Error = ParseBondError;
    fn try_from(value: usize) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Bond::Single),
            2 => Ok(Bond::Double),
            3 => Ok(Bond::Triple),
            4 => Ok(Bond::Aromatic),
            _ => Err(ParseBondError),
        }
    }
}

/// Fragments collected under one R-group index.
#[derive(Debug, Clone, Default)]
pub struct RGroup {
    fragments: Vec<Molecule>,
}

impl RGroup {
    pub fn fragments(&self) -> &[Molecule] {
        &self.fragments
    }

    pub fn add_fragment(&mut self, fragment: Molecule) -> usize {
        self.fragments.push(fragment);
        self.fragments.len() - 1
    }
}

/// A simple, loopless graph with [`Atom`]s as nodes and [`Bond`]s as edges,
/// plus the R-group bookkeeping attached to it.
///
/// Atom and bond ids are stable: removing an atom leaves a gap rather than
/// renumbering the rest.
#[derive(Debug, Clone, Default)]
pub struct Molecule {
    graph: MGraph,
    rgroups: BTreeMap<u32, RGroup>,
    attachment_points: Vec<(usize, usize)>,
    rsite_orders: BTreeMap<usize, BTreeMap<usize, usize>>,
    highlighted_atoms: BTreeSet<usize>,
    highlighted_bonds: BTreeSet<usize>,
}

impl Molecule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct a [`Molecule`] from an existing `MGraph`.
    pub fn from_graph(graph: MGraph) -> Self {
        Self {
            graph,
            ..Self::default()
        }
    }

    /// Return a representation of this molecule as an `MGraph`.
    pub fn graph(&self) -> &MGraph {
        &self.graph
    }

    pub fn add_atom(&mut self, atom: Atom) -> usize {
        self.graph.add_node(atom).index()
    }

    pub fn add_bond(&mut self, u: usize, v: usize, bond: Bond) -> usize {
        self.graph.add_edge(node(u), node(v), bond).index()
    }

    /// Remove an atom and its bonds; other ids are unaffected.
    pub fn remove_atom(&mut self, v: usize) {
        self.graph.remove_node(node(v));
        self.rsite_orders.remove(&v);
    }

    pub fn atom(&self, v: usize) -> Option<&Atom> {
        self.graph.node_weight(node(v))
    }

    pub fn atom_mut(&mut self, v: usize) -> Option<&mut Atom> {
        self.graph.node_weight_mut(node(v))
    }

    pub fn bond(&self, e: usize) -> Option<Bond> {
        self.graph.edge_weight(edge(e)).copied()
    }

    pub fn set_bond(&mut self, e: usize, bond: Bond) {
        if let Some(b) = self.graph.edge_weight_mut(edge(e)) {
            *b = bond;
        }
    }

    pub fn bond_endpoints(&self, e: usize) -> Option<(usize, usize)> {
        self.graph
            .edge_endpoints(edge(e))
            .map(|(u, v)| (u.index(), v.index()))
    }

    pub fn find_bond(&self, u: usize, v: usize) -> Option<usize> {
        self.graph.find_edge(node(u), node(v)).map(|e| e.index())
    }

    pub fn atom_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn bond_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// One past the largest atom id.
    pub fn atom_end(&self) -> usize {
        self.graph.node_bound()
    }

    /// Live atom ids in ascending order.
    pub fn atom_indices(&self) -> Vec<usize> {
        self.graph.node_indices().map(|n| n.index()).sorted().collect()
    }

    /// Live bond ids in ascending order.
    pub fn bond_indices(&self) -> Vec<usize> {
        self.graph.edge_indices().map(|e| e.index()).sorted().collect()
    }

    pub fn neighbors(&self, v: usize) -> Vec<usize> {
        self.graph
            .neighbors(node(v))
            .map(|n| n.index())
            .sorted()
            .collect()
    }

    pub fn is_rsite(&self, v: usize) -> bool {
        self.atom(v).is_some_and(Atom::is_rsite)
    }

    /// Ids of all R-site atoms.
    pub fn rsites(&self) -> Vec<usize> {
        self.atom_indices()
            .into_iter()
            .filter(|&v| self.is_rsite(v))
            .collect()
    }

    /// Number of neighbours of `v` that are not hydrogen.
    pub fn heavy_degree(&self, v: usize) -> usize {
        self.graph
            .neighbors(node(v))
            .filter(|&n| !self.graph[n].is_hydrogen())
            .count()
    }

    /// Copy of the structure without R-group tables, attachment points or
    /// highlighting. Atom and bond ids are preserved.
    pub fn clone_keep_indices(&self) -> Molecule {
        Molecule {
            graph: self.graph.clone(),
            rsite_orders: self.rsite_orders.clone(),
            ..Molecule::default()
        }
    }

    /// Copy of the atoms and bonds listed, in list order. Returns the new
    /// molecule and the old-to-new atom map.
    pub fn edge_submolecule(
        &self,
        atoms: &[usize],
        bonds: &[usize],
    ) -> (Molecule, Vec<Option<usize>>) {
        let (g, map) = edge_subgraph(&self.graph, atoms, bonds);
        (Molecule::from_graph(g), map)
    }

    /// Copy of the atoms accepted by `keep` and every bond between them.
    pub fn induced_submolecule(
        &self,
        keep: impl Fn(usize) -> bool,
    ) -> (Molecule, Vec<Option<usize>>) {
        let (g, map) = induced_subgraph(&self.graph, keep);
        (Molecule::from_graph(g), map)
    }

    pub fn rgroups(&self) -> &BTreeMap<u32, RGroup> {
        &self.rgroups
    }

    /// The R-group with index `idx`, created empty if missing.
    pub fn rgroup_mut(&mut self, idx: u32) -> &mut RGroup {
        self.rgroups.entry(idx).or_default()
    }

    /// `(order, atom)` attachment points of an R-group fragment.
    pub fn attachment_points(&self) -> &[(usize, usize)] {
        &self.attachment_points
    }

    pub fn add_attachment_point(&mut self, order: usize, atom: usize) {
        self.attachment_points.push((order, atom));
    }

    /// Record that the bond from `rsite` to `neighbor` is attachment `order`.
    pub fn set_rsite_attachment_order(&mut self, rsite: usize, neighbor: usize, order: usize) {
        self.rsite_orders
            .entry(rsite)
            .or_default()
            .insert(order, neighbor);
    }

    /// Neighbours of `rsite` ordered by attachment order.
    pub fn rsite_attachment_order(&self, rsite: usize) -> Vec<usize> {
        self.rsite_orders
            .get(&rsite)
            .map(|orders| orders.values().copied().collect())
            .unwrap_or_default()
    }

    pub fn highlight_atom(&mut self, v: usize) {
        self.highlighted_atoms.insert(v);
    }

    pub fn highlight_bond(&mut self, e: usize) {
        self.highlighted_bonds.insert(e);
    }

    pub fn unhighlight_all(&mut self) {
        self.highlighted_atoms.clear();
        self.highlighted_bonds.clear();
    }

    pub fn highlighted_atoms(&self) -> &BTreeSet<usize> {
        &self.highlighted_atoms
    }

    pub fn highlighted_bonds(&self) -> &BTreeSet<usize> {
        &self.highlighted_bonds
    }

    /// Molecular formula in Hill order. Non-element atoms are left out.
    pub fn formula(&self) -> String {
        let counts = self
            .graph
            .node_indices()
            .filter_map(|n| self.graph[n].element())
            .counts();

        let carbon = counts.contains_key(&Element::Carbon);
        let rank = |e: &Element| match e {
            Element::Carbon if carbon => (0, String::new()),
            Element::Hydrogen if carbon => (1, String::new()),
            other => (2, other.to_string()),
        };

        counts
            .iter()
            .sorted_by_key(|(e, _)| rank(e))
            .map(|(e, n)| match n {
                1 => e.to_string(),
                n => format!("{e}{n}"),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ethanol() -> Molecule {
        let mut mol = Molecule::new();
        let c1 = mol.add_atom(Atom::new(Element::Carbon));
        let c2 = mol.add_atom(Atom::new(Element::Carbon));
        let o = mol.add_atom(Atom::new(Element::Oxygen));
        mol.add_bond(c1, c2, Bond::Single);
        mol.add_bond(c2, o, Bond::Single);
        mol
    }

    #[test]
    fn element_to_string() {
        assert!(Element::Hydrogen.to_string() == "H")
    }

    #[test]
    fn element_from_string() {
        assert!(str::parse("H") == Ok(Element::Hydrogen));
        assert!(str::parse::<Element>("Foo").is_err());
    }

    #[test]
    fn bond_from_order() {
        assert_eq!(Bond::try_from(4), Ok(Bond::Aromatic));
        assert!(Bond::try_from(7).is_err());
    }

    #[test]
    fn formula_is_hill_ordered() {
        let mut mol = ethanol();
        let n = mol.add_atom(Atom::new(Element::Nitrogen));
        mol.add_bond(0, n, Bond::Single);
        mol.add_atom(Atom::rsite(1));
        assert_eq!(mol.formula(), "C2NO");
    }

    #[test]
    fn removal_keeps_ids() {
        let mut mol = ethanol();
        mol.remove_atom(1);
        assert_eq!(mol.atom_indices(), vec![0, 2]);
        assert_eq!(mol.bond_count(), 0);
        assert!(mol.atom(2).is_some_and(|a| a.element() == Some(Element::Oxygen)));
    }

    #[test]
    fn rsite_order_is_sorted_by_order() {
        let mut mol = ethanol();
        let r = mol.add_atom(Atom::rsite(1));
        mol.add_bond(r, 0, Bond::Single);
        mol.add_bond(r, 2, Bond::Single);
        mol.set_rsite_attachment_order(r, 2, 2);
        mol.set_rsite_attachment_order(r, 0, 1);
        assert_eq!(mol.rsite_attachment_order(r), vec![0, 2]);
        assert_eq!(mol.rsites(), vec![r]);
    }
}
