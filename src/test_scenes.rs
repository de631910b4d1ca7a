//! Hand-built fixture worlds shared by the module tests.
//!
//! Every scene is a sealed (or deliberately defective) world of axis-aligned cells. The
//! convention throughout: plane normals point along positive axes, walls on the positive
//! side of a cell reference their plane directly, walls on the negative side reference it
//! inverted, and surface windings are counter-clockwise about each wall's outward normal.
//! Each wall carries a backing surface with the reversed winding so the edge slots are
//! fully populated, the way sealed level data has them.

use crate::collision_bsp::{
    Bsp2dRef, Bsp2dReference, Bsp3dLeaf, Bsp3dNode, Bsp3dRef, CollisionBsp, CollisionEdge,
    CollisionSurface, CollisionVertex, LeafFlags, PlaneRef, SurfaceFlags
};
use crate::vector::{Plane3D, Vector3D};

/// Fixture storage; borrow a [`CollisionBsp`] over it with [`bsp`](Self::bsp).
pub(crate) struct Scene<
    const NODES: usize,
    const PLANES: usize,
    const LEAVES: usize,
    const REFS: usize,
    const SURFACES: usize,
    const EDGES: usize,
    const VERTICES: usize
> {
    pub nodes: [Bsp3dNode; NODES],
    pub planes: [Plane3D; PLANES],
    pub leaves: [Bsp3dLeaf; LEAVES],
    pub references: [Bsp2dReference; REFS],
    pub surfaces: [CollisionSurface; SURFACES],
    pub edges: [CollisionEdge; EDGES],
    pub vertices: [CollisionVertex; VERTICES]
}

impl<
    const NODES: usize,
    const PLANES: usize,
    const LEAVES: usize,
    const REFS: usize,
    const SURFACES: usize,
    const EDGES: usize,
    const VERTICES: usize
> Scene<NODES, PLANES, LEAVES, REFS, SURFACES, EDGES, VERTICES> {
    pub fn bsp(&self) -> CollisionBsp<'_> {
        CollisionBsp {
            bsp3d_nodes: &self.nodes,
            planes: &self.planes,
            leaves: &self.leaves,
            bsp2d_references: &self.references,
            bsp2d_nodes: &[],
            surfaces: &self.surfaces,
            edges: &self.edges,
            vertices: &self.vertices
        }
    }
}

const fn axis_plane(axis: usize, offset: f32) -> Plane3D {
    Plane3D {
        vector: Vector3D {
            x: if axis == 0 { 1.0 } else { 0.0 },
            y: if axis == 1 { 1.0 } else { 0.0 },
            z: if axis == 2 { 1.0 } else { 0.0 }
        },
        offset
    }
}

const fn node(plane: usize, back: Bsp3dRef, front: Bsp3dRef) -> Bsp3dNode {
    Bsp3dNode { plane, children: [back, front] }
}

const fn leaf(flags: LeafFlags, first_reference: usize, reference_count: u16) -> Bsp3dLeaf {
    Bsp3dLeaf { flags, reference_count, first_reference }
}

const fn reference(plane: usize, inverted: bool, surface: usize) -> Bsp2dReference {
    Bsp2dReference {
        plane: PlaneRef::new(plane, inverted),
        root: Bsp2dRef::surface(surface)
    }
}

const fn surface(plane: usize, inverted: bool, first_edge: usize, flags: SurfaceFlags, material: i16) -> CollisionSurface {
    CollisionSurface {
        plane: PlaneRef::new(plane, inverted),
        first_edge,
        flags,
        breakable_surface: 0,
        material
    }
}

const fn vertex(x: f32, y: f32, z: f32) -> CollisionVertex {
    CollisionVertex {
        point: Vector3D { x, y, z },
        first_edge: 0
    }
}

/// Builds the four edges of a standalone quad wound `v[0] -> v[1] -> v[2] -> v[3]` about
/// `front`'s outward normal, with `back` winding the same loop in reverse. `base` is the
/// index of the first produced edge within the scene's edge array.
const fn quad_edges(v: [usize; 4], base: usize, front: usize, back: usize) -> [CollisionEdge; 4] {
    [
        CollisionEdge { vertices: [v[0], v[1]], edges: [base + 1, base + 3], surfaces: [front, back] },
        CollisionEdge { vertices: [v[1], v[2]], edges: [base + 2, base], surfaces: [front, back] },
        CollisionEdge { vertices: [v[2], v[3]], edges: [base + 3, base + 1], surfaces: [front, back] },
        CollisionEdge { vertices: [v[3], v[0]], edges: [base, base + 2], surfaces: [front, back] }
    ]
}

const fn concat_edges<const A: usize, const B: usize, const OUT: usize>(
    a: [CollisionEdge; A],
    b: [CollisionEdge; B]
) -> [CollisionEdge; OUT] {
    let mut out = [CollisionEdge { vertices: [0; 2], edges: [0; 2], surfaces: [0; 2] }; OUT];
    let mut i = 0;
    while i < A {
        out[i] = a[i];
        i += 1;
    }
    while i < A + B {
        out[i] = b[i - A];
        i += 1;
    }
    out
}

pub(crate) type CubeRoom = Scene<6, 6, 1, 6, 6, 12, 8>;

/// A sealed room spanning `[-1, 1]` on every axis: one interior leaf, six walls.
///
/// Plane and surface `i` correspond; surfaces 0 and 1 are the +X and -X walls, 2 and 3 the
/// +Y and -Y walls, 4 and 5 the +Z and -Z walls.
pub(crate) fn cube_room() -> CubeRoom {
    let ext = Bsp3dRef::EXTERIOR;

    CubeRoom {
        planes: [
            axis_plane(0, 1.0),
            axis_plane(0, -1.0),
            axis_plane(1, 1.0),
            axis_plane(1, -1.0),
            axis_plane(2, 1.0),
            axis_plane(2, -1.0)
        ],
        // Bounds partition the world in y, z, x order so the room leaf sits deepest.
        nodes: [
            node(3, ext, Bsp3dRef::node(1)),
            node(2, Bsp3dRef::node(2), ext),
            node(5, ext, Bsp3dRef::node(3)),
            node(4, Bsp3dRef::node(4), ext),
            node(1, ext, Bsp3dRef::node(5)),
            node(0, Bsp3dRef::leaf(0), ext)
        ],
        leaves: [leaf(LeafFlags::empty(), 0, 6)],
        references: [
            reference(0, false, 0),
            reference(1, true, 1),
            reference(2, false, 2),
            reference(3, true, 3),
            reference(4, false, 4),
            reference(5, true, 5)
        ],
        surfaces: [
            surface(0, false, 0, SurfaceFlags::empty(), 0),
            surface(1, true, 4, SurfaceFlags::empty(), 1),
            surface(2, false, 6, SurfaceFlags::empty(), 2),
            surface(3, true, 10, SurfaceFlags::empty(), 3),
            surface(4, false, 11, SurfaceFlags::empty(), 4),
            surface(5, true, 7, SurfaceFlags::empty(), 5)
        ],
        // The twelve cube edges; each is shared by exactly two walls, wound in opposite
        // directions.
        edges: [
            CollisionEdge { vertices: [1, 2], edges: [1, 10], surfaces: [0, 5] },
            CollisionEdge { vertices: [2, 6], edges: [2, 9], surfaces: [0, 2] },
            CollisionEdge { vertices: [6, 5], edges: [3, 8], surfaces: [0, 4] },
            CollisionEdge { vertices: [5, 1], edges: [0, 11], surfaces: [0, 3] },
            CollisionEdge { vertices: [0, 4], edges: [5, 10], surfaces: [1, 3] },
            CollisionEdge { vertices: [4, 7], edges: [6, 11], surfaces: [1, 4] },
            CollisionEdge { vertices: [7, 3], edges: [7, 8], surfaces: [1, 2] },
            CollisionEdge { vertices: [3, 0], edges: [4, 9], surfaces: [1, 5] },
            CollisionEdge { vertices: [7, 6], edges: [1, 5], surfaces: [2, 4] },
            CollisionEdge { vertices: [2, 3], edges: [6, 0], surfaces: [2, 5] },
            CollisionEdge { vertices: [0, 1], edges: [3, 7], surfaces: [3, 5] },
            CollisionEdge { vertices: [5, 4], edges: [4, 2], surfaces: [3, 4] }
        ],
        vertices: [
            vertex(-1.0, -1.0, -1.0),
            vertex(1.0, -1.0, -1.0),
            vertex(1.0, 1.0, -1.0),
            vertex(-1.0, 1.0, -1.0),
            vertex(-1.0, -1.0, 1.0),
            vertex(1.0, -1.0, 1.0),
            vertex(1.0, 1.0, 1.0),
            vertex(-1.0, 1.0, 1.0)
        ]
    }
}

pub(crate) type PhantomHallway = Scene<8, 8, 2, 2, 4, 8, 8>;

/// Two rooms in a row, with a defective wall between them.
///
/// Room 0 spans `x in [-1, 1]`, room 1 spans `x in [2, 4]`; the band between is exterior.
/// Room 0's +X wall polygon only covers `y <= 0.5`, but its partition claims the whole
/// face, so crossings above the polygon are phantom hits. When `sealed` is true, room 1's
/// -X wall is referenced (confirming deferred hits); when false, that crossing leaks.
pub(crate) fn phantom_hallway(sealed: bool) -> PhantomHallway {
    let ext = Bsp3dRef::EXTERIOR;

    PhantomHallway {
        planes: [
            axis_plane(1, -1.0),
            axis_plane(1, 1.0),
            axis_plane(2, -1.0),
            axis_plane(2, 1.0),
            axis_plane(0, -1.0),
            axis_plane(0, 1.0),
            axis_plane(0, 2.0),
            axis_plane(0, 4.0)
        ],
        nodes: [
            node(0, ext, Bsp3dRef::node(1)),
            node(1, Bsp3dRef::node(2), ext),
            node(2, ext, Bsp3dRef::node(3)),
            node(3, Bsp3dRef::node(4), ext),
            node(4, ext, Bsp3dRef::node(5)),
            node(5, Bsp3dRef::leaf(0), Bsp3dRef::node(6)),
            node(6, ext, Bsp3dRef::node(7)),
            node(7, Bsp3dRef::leaf(1), ext)
        ],
        leaves: [
            leaf(LeafFlags::empty(), 0, 1),
            leaf(LeafFlags::empty(), 1, if sealed { 1 } else { 0 })
        ],
        references: [reference(5, false, 0), reference(6, true, 2)],
        surfaces: [
            surface(5, false, 0, SurfaceFlags::empty(), 0),
            surface(5, true, 0, SurfaceFlags::empty(), 0),
            surface(6, true, 4, SurfaceFlags::empty(), 0),
            surface(6, false, 4, SurfaceFlags::empty(), 0)
        ],
        edges: concat_edges::<4, 4, 8>(
            quad_edges([0, 1, 2, 3], 0, 0, 1),
            quad_edges([4, 5, 6, 7], 4, 2, 3)
        ),
        vertices: [
            // Room 0's +X wall only reaches y = 0.5.
            vertex(1.0, -1.0, -1.0),
            vertex(1.0, 0.5, -1.0),
            vertex(1.0, 0.5, 1.0),
            vertex(1.0, -1.0, 1.0),
            // Room 1's -X wall covers its whole face.
            vertex(2.0, -1.0, -1.0),
            vertex(2.0, -1.0, 1.0),
            vertex(2.0, 1.0, 1.0),
            vertex(2.0, 1.0, -1.0)
        ]
    }
}

pub(crate) type CoplanarLeakRoom = Scene<7, 7, 1, 1, 2, 4, 4>;

/// A sealed room whose +X wall is referenced under the wrong plane.
///
/// The tree partitions the +X boundary on plane 6 (`x = 1`), but the room leaf's only 2D
/// reference sits on the nearly coplanar ancestor plane 5 (`x = 1.00005`). Crossings of
/// plane 6 therefore leak; recovery finds the wall by retrying the search under the
/// ancestor plane.
pub(crate) fn coplanar_leak_room() -> CoplanarLeakRoom {
    let ext = Bsp3dRef::EXTERIOR;

    CoplanarLeakRoom {
        planes: [
            axis_plane(1, -1.0),
            axis_plane(1, 1.0),
            axis_plane(2, -1.0),
            axis_plane(2, 1.0),
            axis_plane(0, -1.0),
            axis_plane(0, 1.00005),
            axis_plane(0, 1.0)
        ],
        nodes: [
            node(0, ext, Bsp3dRef::node(1)),
            node(1, Bsp3dRef::node(2), ext),
            node(2, ext, Bsp3dRef::node(3)),
            node(3, Bsp3dRef::node(4), ext),
            node(4, ext, Bsp3dRef::node(5)),
            node(5, Bsp3dRef::node(6), ext),
            node(6, Bsp3dRef::leaf(0), ext)
        ],
        leaves: [leaf(LeafFlags::empty(), 0, 1)],
        references: [reference(5, false, 0)],
        surfaces: [
            surface(6, false, 0, SurfaceFlags::empty(), 0),
            surface(6, true, 0, SurfaceFlags::empty(), 0)
        ],
        edges: quad_edges([0, 1, 2, 3], 0, 0, 1),
        vertices: [
            vertex(1.0, -1.0, -1.0),
            vertex(1.0, 1.0, -1.0),
            vertex(1.0, 1.0, 1.0),
            vertex(1.0, -1.0, 1.0)
        ]
    }
}

pub(crate) type SliverLeakRooms = Scene<7, 7, 2, 1, 2, 4, 4>;

/// A room with a degenerate sliver cut off by a nearly coplanar partition.
///
/// Plane 5 (`x = 0.9999`) splits the interior into the room proper and a paper-thin sliver
/// leaf against the +X boundary at plane 6 (`x = 1`). The wall reference stayed with the
/// room, so crossings of the sliver's boundary leak. A crossing into the sliver recovers
/// the wall from the room leaf on the other side of the partition; a crossing out of it
/// stops at the sliver's own subtree and stays lost.
pub(crate) fn sliver_leak_rooms() -> SliverLeakRooms {
    let ext = Bsp3dRef::EXTERIOR;

    SliverLeakRooms {
        planes: [
            axis_plane(1, -1.0),
            axis_plane(1, 1.0),
            axis_plane(2, -1.0),
            axis_plane(2, 1.0),
            axis_plane(0, -1.0),
            axis_plane(0, 0.9999),
            axis_plane(0, 1.0)
        ],
        nodes: [
            node(0, ext, Bsp3dRef::node(1)),
            node(1, Bsp3dRef::node(2), ext),
            node(2, ext, Bsp3dRef::node(3)),
            node(3, Bsp3dRef::node(4), ext),
            node(4, ext, Bsp3dRef::node(5)),
            node(5, Bsp3dRef::leaf(0), Bsp3dRef::node(6)),
            node(6, Bsp3dRef::leaf(1), ext)
        ],
        leaves: [leaf(LeafFlags::empty(), 0, 1), leaf(LeafFlags::empty(), 1, 0)],
        references: [reference(6, false, 0)],
        surfaces: [
            surface(6, false, 0, SurfaceFlags::empty(), 0),
            surface(6, true, 0, SurfaceFlags::empty(), 0)
        ],
        edges: quad_edges([0, 1, 2, 3], 0, 0, 1),
        vertices: [
            vertex(1.0, -1.0, -1.0),
            vertex(1.0, 1.0, -1.0),
            vertex(1.0, 1.0, 1.0),
            vertex(1.0, -1.0, 1.0)
        ]
    }
}

/// Knobs for [`double_sided_room`].
#[derive(Copy, Clone)]
pub(crate) struct DoubleSidedOptions {
    /// Flags carried by both pane surfaces.
    pub pane_flags: SurfaceFlags,
    /// Mark the x < 0 leaf as containing double-sided surfaces.
    pub leaf0_double_sided: bool,
    /// Mark the x > 0 leaf as containing double-sided surfaces.
    pub leaf1_double_sided: bool,
    /// Reference the +X exit wall from the x > 0 leaf; when false, leaving through it
    /// leaks.
    pub sealed_exit: bool
}

impl Default for DoubleSidedOptions {
    fn default() -> Self {
        Self {
            pane_flags: SurfaceFlags::TWO_SIDED,
            leaf0_double_sided: true,
            leaf1_double_sided: true,
            sealed_exit: false
        }
    }
}

pub(crate) type DoubleSidedRoom = Scene<7, 7, 2, 3, 4, 8, 8>;

/// A room spanning `[-1, 1]` split at `x = 0` by a pane of glass that only covers
/// `y <= 0`.
///
/// Surfaces 0 and 1 are the two sides of the pane; surfaces 2 and 3 the +X exit wall
/// reachable past it.
pub(crate) fn double_sided_room(options: DoubleSidedOptions) -> DoubleSidedRoom {
    let ext = Bsp3dRef::EXTERIOR;

    let leaf_flags = |double_sided: bool| {
        if double_sided {
            LeafFlags::CONTAINS_DOUBLE_SIDED_SURFACES
        }
        else {
            LeafFlags::empty()
        }
    };

    DoubleSidedRoom {
        planes: [
            axis_plane(1, -1.0),
            axis_plane(1, 1.0),
            axis_plane(2, -1.0),
            axis_plane(2, 1.0),
            axis_plane(0, -1.0),
            axis_plane(0, 1.0),
            axis_plane(0, 0.0)
        ],
        nodes: [
            node(0, ext, Bsp3dRef::node(1)),
            node(1, Bsp3dRef::node(2), ext),
            node(2, ext, Bsp3dRef::node(3)),
            node(3, Bsp3dRef::node(4), ext),
            node(4, ext, Bsp3dRef::node(5)),
            node(5, Bsp3dRef::node(6), ext),
            node(6, Bsp3dRef::leaf(0), Bsp3dRef::leaf(1))
        ],
        leaves: [
            leaf(leaf_flags(options.leaf0_double_sided), 0, 1),
            leaf(
                leaf_flags(options.leaf1_double_sided),
                1,
                if options.sealed_exit { 2 } else { 1 }
            )
        ],
        references: [
            reference(6, false, 0),
            reference(6, true, 1),
            reference(5, false, 2)
        ],
        surfaces: [
            surface(6, false, 0, options.pane_flags, 0),
            surface(6, true, 0, options.pane_flags, 0),
            surface(5, false, 4, SurfaceFlags::empty(), 0),
            surface(5, true, 4, SurfaceFlags::empty(), 0)
        ],
        edges: concat_edges::<4, 4, 8>(
            quad_edges([0, 1, 2, 3], 0, 0, 1),
            quad_edges([4, 5, 6, 7], 4, 2, 3)
        ),
        vertices: [
            // The pane only reaches y = 0.
            vertex(0.0, -1.0, -1.0),
            vertex(0.0, 0.0, -1.0),
            vertex(0.0, 0.0, 1.0),
            vertex(0.0, -1.0, 1.0),
            // The +X exit wall covers its whole face.
            vertex(1.0, -1.0, -1.0),
            vertex(1.0, 1.0, -1.0),
            vertex(1.0, 1.0, 1.0),
            vertex(1.0, -1.0, 1.0)
        ]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn scenes_validate() {
        cube_room().bsp().validate().expect("cube room");
        phantom_hallway(false).bsp().validate().expect("phantom hallway, leaky");
        phantom_hallway(true).bsp().validate().expect("phantom hallway, sealed");
        coplanar_leak_room().bsp().validate().expect("coplanar leak room");
        sliver_leak_rooms().bsp().validate().expect("sliver leak rooms");
        double_sided_room(DoubleSidedOptions::default())
            .bsp()
            .validate()
            .expect("double-sided room");
        double_sided_room(DoubleSidedOptions {
            sealed_exit: true,
            ..DoubleSidedOptions::default()
        })
        .bsp()
        .validate()
        .expect("double-sided room, sealed exit");
    }

    #[test]
    fn cube_winding_is_consistent() {
        let scene = cube_room();
        let bsp = scene.bsp();

        // Every wall's edge loop returns to its first edge after four steps, and each step's
        // next vertex is the following step's first vertex.
        for (surface_index, surface) in bsp.surfaces.iter().enumerate() {
            let first_edge = surface.first_edge;
            let mut edge_index = first_edge;
            let mut steps = 0;
            loop {
                let edge = &bsp.edges[edge_index];
                let next_index = edge.next_edge(surface_index);
                assert_eq!(
                    bsp.edges[next_index].first_vertex(surface_index),
                    edge.next_vertex(surface_index),
                    "winding broken at surface {surface_index} edge {edge_index}"
                );
                edge_index = next_index;
                steps += 1;
                if edge_index == first_edge {
                    break;
                }
            }
            assert_eq!(steps, 4);
        }
    }
}
