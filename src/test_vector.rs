//! Tests a vector against a collision BSP, with phantom BSP and BSP leak mitigations.
//!
//! The traversal descends the 3D tree along the vector, classifying every leaf transition.
//! Transitions across solid partitions ask the crossed leaf for a surface; the mitigation
//! layer then decides whether the candidate is genuine before it may be committed. The
//! numeric behaviour of the game's own traversal is preserved exactly: plane tests
//! accumulate in double precision, comparisons treat a coplanar point as in front, and an
//! intersection that predates the current best fraction prunes the far subtree.

use bitflags::bitflags;
use log::trace;
use tinyvec::ArrayVec;

use crate::collision_bsp::{
    BitVector, Bsp3dChild, Bsp3dRef, CollisionBsp, LeafType, PlaneRef, SurfaceFlags
};
use crate::leak::try_resolve_leak;
use crate::surface::{search_leaf, surface_test3d};
use crate::vector::Vector3D;

bitflags! {
    /// Flags that control collision and intersection-testing behaviour.
    ///
    /// Only the surface-facing and surface-kind bits participate in BSP testing; the
    /// category and object bits are carried so a full wire mask round-trips, and belong to
    /// the object-collision layers above this crate.
    #[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
    pub struct TestFlags: u32 {
        /// Record hits on front-facing surfaces.
        ///
        /// If neither this nor [`BACK_FACING_SURFACES`](Self::BACK_FACING_SURFACES) is
        /// supplied, both default to set.
        const FRONT_FACING_SURFACES = 1 << 0;
        /// Record hits on back-facing surfaces.
        const BACK_FACING_SURFACES = 1 << 1;

        /// Suppress hits on double-sided surfaces.
        const IGNORE_TWO_SIDED_SURFACES = 1 << 2;
        /// Reject hits on surfaces flagged invisible.
        const IGNORE_INVISIBLE_SURFACES = 1 << 3;
        /// Reject hits on surfaces flagged breakable.
        const IGNORE_BREAKABLE_SURFACES = 1 << 4;

        /// The bits relevant for testing a vector against a BSP.
        const BSP_BITS = Self::FRONT_FACING_SURFACES.bits()
            | Self::BACK_FACING_SURFACES.bits()
            | Self::IGNORE_TWO_SIDED_SURFACES.bits()
            | Self::IGNORE_INVISIBLE_SURFACES.bits()
            | Self::IGNORE_BREAKABLE_SURFACES.bits();

        /// Test against level structure.
        const STRUCTURE = 1 << 5;
        /// Test against media (water and the like).
        const MEDIA = 1 << 6;
        /// Test against objects.
        const OBJECTS = 1 << 7;

        /// Test against bipeds.
        const BIPEDS = 1 << 8;
        /// Test against vehicles.
        const VEHICLES = 1 << 9;
        /// Test against weapons.
        const WEAPONS = 1 << 10;
        /// Test against equipment.
        const EQUIPMENT = 1 << 11;
        /// Test against garbage.
        const GARBAGE = 1 << 12;
        /// Test against projectiles.
        const PROJECTILES = 1 << 13;
        /// Test against scenery.
        const SCENERY = 1 << 14;
        /// Test against machines.
        const MACHINES = 1 << 15;
        /// Test against controls.
        const CONTROLS = 1 << 16;
        /// Test against light fixtures.
        const LIGHT_FIXTURES = 1 << 17;
        /// Test against placeholders.
        const PLACEHOLDERS = 1 << 18;
        /// Test against sound scenery.
        const SOUND_SCENERY = 1 << 19;

        /// Keep the resulting location valid for object placement.
        const TRY_TO_KEEP_LOCATION_VALID = 1 << 20;
        /// Skip bipeds the vector may pass through.
        const SKIP_PASSTHROUGH_BIPEDS = 1 << 21;
        /// Test vehicles by their mass spheres instead of their collision models.
        const USE_VEHICLE_PHYSICS = 1 << 22;
    }
}

/// Switches for the defect repairs layered over the game's traversal.
///
/// These travel with each query so callers and tests can toggle them deterministically.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Mitigations {
    /// Reject phantom hits where a partitioning plane overhangs its surface, using the
    /// deferred-commit policy: a suspicious hit is held back until a later surface confirms
    /// it or a leak refutes it.
    pub phantom_bsp: bool,
    /// Recover surfaces lost to missing 2D references; see [`crate::leak`].
    pub bsp_leaks: bool,
    /// Corroborate failed projected-containment tests on two-sided partitions by probing
    /// the orientation of the next surface along the vector, instead of relying on the
    /// deferred-commit policy.
    pub orientation_probe: bool
}

impl Mitigations {
    /// The game's original behaviour: phantom BSP and BSP leaks included.
    #[must_use]
    pub const fn vanilla() -> Self {
        Self {
            phantom_bsp: false,
            bsp_leaks: false,
            orientation_probe: false
        }
    }

    const fn observing_leaks(self) -> bool {
        self.phantom_bsp || self.bsp_leaks
    }
}

impl Default for Mitigations {
    fn default() -> Self {
        Self {
            phantom_bsp: true,
            bsp_leaks: true,
            orientation_probe: false
        }
    }
}

/// The diagnostic stacks saturate at this many entries; the last slot is overwritten once
/// full. Correctness of the intersection result is unaffected.
pub const STACK_DEPTH: usize = 0x100;

/// The surface a vector test intersected.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct SurfaceResult {
    /// The index of the surface.
    pub index: usize,
    /// The surface plane, with orientation.
    pub plane: PlaneRef,
    /// The surface flags.
    pub flags: SurfaceFlags,
    /// The breakable surface index.
    pub breakable_surface: u8,
    /// The surface material type.
    pub material: i16
}

/// Receives the result of a vector test.
#[derive(Clone, Debug, Default)]
pub struct TestVectorResult {
    /// The relative distance to the earliest intersection, or the clamped maximum fraction
    /// if nothing was intersected.
    pub fraction: f32,
    /// The index of the splitting plane of the earliest intersection, into the BSP's plane
    /// array.
    pub last_split: Option<usize>,
    /// The intersected surface.
    pub surface: Option<SurfaceResult>,
    /// The BSP interior leaves visited, in traversal order, saturating at
    /// [`STACK_DEPTH`] entries.
    pub leaves: ArrayVec<[u32; STACK_DEPTH]>
}

impl TestVectorResult {
    /// Instantiate an empty result.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// One step of the traversal's descent path.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub(crate) struct NodeVisit {
    /// The 3D node index.
    pub node: u32,
    /// `true` if the path continued into the node's front child.
    pub front: bool
}

pub(crate) type NodeStack = ArrayVec<[NodeVisit; STACK_DEPTH]>;

/// A speculative intersection held back for confirmation.
#[derive(Copy, Clone, Debug)]
struct PendingResult {
    fraction: f32,
    plane: usize,
    surface: usize
}

/// Manages the state required for a BSP-vector intersection test.
struct TestContext<'a, 'b> {
    flags: TestFlags,
    bsp: &'b CollisionBsp<'a>,
    breakable_surfaces: &'b BitVector<'b>,
    origin: &'b Vector3D,
    delta: &'b Vector3D,
    mitigations: Mitigations,

    data: &'b mut TestVectorResult,

    // Immediate history values.
    /// The previous leaf visited.
    leaf: Option<usize>,
    /// The category of the previous leaf visited.
    leaf_type: LeafType,
    /// The last plane crossed.
    plane: Option<usize>,

    // Mitigation state.
    /// `true` if the last solid partition was a leak.
    just_encountered_leak: bool,
    /// Held back until the solid partition that follows features no leak.
    pending: Option<PendingResult>,
    /// The descent path to the node currently under test.
    node_stack: NodeStack,
    /// The descent path to the last interior leaf visited.
    interior_node_stack: NodeStack
}

impl<'a> CollisionBsp<'a> {
    /// Tests a vector against the collision BSP.
    ///
    /// `max_fraction` is clamped to `[0, 1]`; `data.fraction` starts at the clamped value,
    /// so a recorded hit never exceeds the cap. The vector runs from `origin` to
    /// `origin + delta`, and both endpoints of any recorded fraction parameterise a point
    /// on it.
    ///
    /// Returns `true` if a surface was intersected, in which case `data` carries the
    /// fraction, splitting plane, and surface.
    #[expect(clippy::too_many_arguments)]
    pub fn test_vector(
        &self,
        breakable_surfaces: &BitVector,
        origin: &Vector3D,
        delta: &Vector3D,
        max_fraction: f32,
        flags: TestFlags,
        mitigations: Mitigations,
        data: &mut TestVectorResult
    ) -> bool {
        debug_assert!(origin.is_valid() && delta.is_valid());
        debug_assert!(!self.bsp3d_nodes.is_empty());

        let mut flags = flags & TestFlags::BSP_BITS;
        if !flags.intersects(TestFlags::FRONT_FACING_SURFACES | TestFlags::BACK_FACING_SURFACES) {
            flags |= TestFlags::FRONT_FACING_SURFACES | TestFlags::BACK_FACING_SURFACES;
        }

        let max_fraction = max_fraction.clamp(0.0, 1.0);
        data.fraction = max_fraction;
        data.last_split = None;
        data.surface = None;
        data.leaves.clear();

        let mut ctx = TestContext {
            flags,
            bsp: self,
            breakable_surfaces,
            origin,
            delta,
            mitigations,
            data,
            leaf: None,
            leaf_type: LeafType::None,
            plane: None,
            just_encountered_leak: false,
            pending: None,
            node_stack: NodeStack::new(),
            interior_node_stack: NodeStack::new()
        };

        if ctx.test_node(Bsp3dRef::node(0), 0.0, max_fraction) {
            true
        }
        else {
            ctx.try_commit_pending_result()
        }
    }
}

impl<'a, 'b> TestContext<'a, 'b> {
    /// Tests the vector against the subtree at `root` over the window `[fraction, terminal]`.
    fn test_node(&mut self, root: Bsp3dRef, fraction: f32, terminal: f32) -> bool {
        let node_index = match root.decode() {
            Bsp3dChild::Node(index) => index,
            Bsp3dChild::Leaf(leaf) => return self.test_leaf(Some(leaf), fraction),
            Bsp3dChild::Exterior => return self.test_leaf(None, fraction)
        };

        let node = self.bsp.bsp3d_nodes[node_index];
        let plane = self.bsp.planes[node.plane];

        // Both window endpoints are tested against the node plane. If they land on the same
        // side, only that subtree matters; otherwise the near subtree is searched first and
        // the far subtree only if nothing earlier already intersected.
        let test_origin = plane.distance_to_point(*self.origin);
        let dot_delta = self.delta.dot_wide(&plane.vector);
        let point_test = test_origin + fraction as f64 * dot_delta;
        let terminal_test = test_origin + terminal as f64 * dot_delta;
        let any_before = point_test < 0.0 || terminal_test < 0.0;
        let any_after = point_test >= 0.0 || terminal_test >= 0.0;

        if !any_before || !any_after {
            let depth = self.node_stack.len();
            self.push_node(node_index, any_after);
            let result = self.test_node(node.child(any_after), fraction, terminal);
            self.node_stack.truncate(depth);
            return result;
        }

        // The window straddles the plane, so <n, delta> != 0 and the division is sound.
        // <n, delta> < 0 if and only if the point at `fraction` is in front of the plane;
        // the comparison is retained as is from the game.
        let plane_faces_forward = !(dot_delta >= 0.0);
        let first_child = node.child(plane_faces_forward);
        let second_child = node.child(!plane_faces_forward);
        let intersection = (-(test_origin / dot_delta)) as f32;

        let depth = self.node_stack.len();
        self.push_node(node_index, plane_faces_forward);
        if self.test_node(first_child, fraction, intersection) {
            return true;
        }
        self.node_stack.truncate(depth);

        if self.data.fraction <= intersection {
            // An intersection already on record predates the splitting plane.
            return false;
        }

        self.plane = Some(node.plane);
        self.push_node(node_index, !plane_faces_forward);
        let result = self.test_node(second_child, intersection, terminal);
        self.node_stack.truncate(depth);
        result
    }

    /// Classifies the transition into `leaf` and dispatches the solid-partition cases.
    fn test_leaf(&mut self, leaf: Option<usize>, fraction: f32) -> bool {
        let leaf_type = self.bsp.classify_leaf(leaf);

        let test_front = self.flags.contains(TestFlags::FRONT_FACING_SURFACES);
        let test_back = self.flags.contains(TestFlags::BACK_FACING_SURFACES);

        // While mitigating, interior-exterior transitions are walked even when the caller
        // did not ask for that orientation: their leak or no-leak outcomes are the evidence
        // that confirms or rejects pending hits. Only desired orientations may commit.
        let observing = self.mitigations.observing_leaks();

        if (test_front || observing)
            && self.leaf_type.is_interior()
            && leaf_type == LeafType::Exterior
        {
            // Plane splits BSP interior at self.leaf from BSP exterior at leaf.
            if self.visit_surface(self.leaf, fraction, false, test_front, false) {
                return true;
            }
        }
        else if (test_back || observing)
            && self.leaf_type == LeafType::Exterior
            && leaf_type.is_interior()
        {
            // Plane splits BSP exterior at self.leaf from BSP interior at leaf.
            if self.visit_surface(leaf, fraction, false, test_back, false) {
                return true;
            }
        }
        else if !self.flags.contains(TestFlags::IGNORE_TWO_SIDED_SURFACES)
            && self.leaf_type == LeafType::DoubleSided
            && leaf_type == LeafType::DoubleSided
        {
            // Plane splits BSP interior leaves at self.leaf and leaf. A miss here is not a
            // sealed-world violation; the double-sided surface may simply end, or be broken.
            let tested_leaf = if test_front { self.leaf } else { leaf };
            if self.visit_surface(tested_leaf, fraction, true, true, false) {
                return true;
            }
        }
        else if self.mitigations.bsp_leaks
            && ((self.leaf_type == LeafType::Interior && leaf_type == LeafType::DoubleSided)
                || (self.leaf_type == LeafType::DoubleSided && leaf_type == LeafType::Interior))
        {
            // A one-sided boundary between a plain interior cell and a double-sided cell is
            // a leak candidate. Any surface found must survive volumetric containment.
            let tested_leaf = if test_front { self.leaf } else { leaf };
            if self.visit_surface(tested_leaf, fraction, false, true, true) {
                return true;
            }
        }

        // Record the leaf into the query.
        if let Some(leaf) = leaf {
            if self.data.leaves.len() < STACK_DEPTH {
                self.data.leaves.push(leaf as u32);
            }
            else {
                self.data.leaves[STACK_DEPTH - 1] = leaf as u32;
            }
        }

        self.leaf = leaf;
        self.leaf_type = leaf_type;
        if leaf_type.is_interior() {
            self.interior_node_stack = self.node_stack.clone();
        }

        false
    }

    /// Searches the tested leaf for the intersected surface, filters the candidate through
    /// the mitigations, and attempts to commit it.
    fn visit_surface(
        &mut self,
        leaf: Option<usize>,
        fraction: f32,
        splits_interior: bool,
        commit_result: bool,
        verify: bool
    ) -> bool {
        let Some(leaf_index) = leaf else {
            return false;
        };
        let Some(plane_index) = self.plane else {
            // A transition implies a crossing, so a plane is always on record by now.
            debug_assert!(false, "leaf transition without a crossed plane");
            return false;
        };

        // true if the vector is testing the front of the surface found (if any)
        let frontfacing = self.leaf_type.is_interior();

        let mut fraction = fraction;
        let mut plane_index = plane_index;
        let expected_front = if self.mitigations.orientation_probe {
            Some(frontfacing)
        }
        else {
            None
        };

        let mut surface = search_leaf(
            self.bsp,
            self.breakable_surfaces,
            leaf_index,
            plane_index,
            splits_interior,
            self.origin,
            self.delta,
            fraction,
            expected_front
        );

        if verify {
            if let Some(candidate) = surface {
                if !surface_test3d(self.bsp, self.breakable_surfaces, candidate, self.origin, self.delta) {
                    surface = None;
                }
            }
        }

        if surface.is_none() && !splits_interior && self.mitigations.bsp_leaks {
            surface = try_resolve_leak(
                self.bsp,
                self.breakable_surfaces,
                &self.node_stack,
                &self.interior_node_stack,
                leaf_index,
                plane_index,
                self.origin,
                self.delta,
                fraction
            );
        }

        if !verify {
            // true when a leak remains on the crossed plane in this leaf
            let leak_encountered = !splits_interior && surface.is_none();

            if leak_encountered && self.pending.is_some() {
                // The surface that would have confirmed the pending hit failed to appear.
                trace!("pending hit rejected by a leak on plane {plane_index}");
                self.pending = None;
            }

            if surface.is_none() {
                // Nothing to decide.
            }
            else if let Some(pending) = self.pending.take() {
                // The pending hit is confirmed by the current surface; it supersedes the
                // current result. Confirmation resolves the pending slot either way, so a
                // surface the commit filter rejects cannot shadow later candidates.
                trace!("pending hit on plane {} confirmed", pending.plane);
                fraction = pending.fraction;
                plane_index = pending.plane;
                surface = Some(pending.surface);
            }
            else if !commit_result {
                // The caller is only observing this transition.
                surface = None;
            }
            else if self.mitigations.phantom_bsp && !splits_interior {
                if let Some(candidate) = surface {
                    if surface_test3d(self.bsp, self.breakable_surfaces, candidate, self.origin, self.delta) {
                        // The candidate holds up volumetrically.
                    }
                    else if frontfacing {
                        // Hold the hit back until a later surface confirms it or a leak
                        // refutes it.
                        trace!("suspicious hit on surface {candidate}; holding pending");
                        self.pending = Some(PendingResult {
                            fraction,
                            plane: plane_index,
                            surface: candidate
                        });
                        surface = None;
                    }
                    else if self.just_encountered_leak {
                        // A back-facing candidate right after a leak is corroborated phantom.
                        trace!("back-facing hit on surface {candidate} rejected after a leak");
                        surface = None;
                    }
                }
            }

            self.just_encountered_leak = leak_encountered;
        }

        self.try_commit_result(fraction, plane_index, surface)
    }

    /// Attempts to commit a surface intersection into the result.
    fn try_commit_result(
        &mut self,
        fraction: f32,
        plane_index: usize,
        surface: Option<usize>
    ) -> bool {
        let Some(surface_index) = surface else {
            return false;
        };

        let surface = &self.bsp.surfaces[surface_index];

        let test_invisible = !self.flags.contains(TestFlags::IGNORE_INVISIBLE_SURFACES);
        let test_breakable = !self.flags.contains(TestFlags::IGNORE_BREAKABLE_SURFACES);
        if (surface.flags.contains(SurfaceFlags::INVISIBLE) && !test_invisible)
            || (surface.flags.contains(SurfaceFlags::BREAKABLE) && !test_breakable)
        {
            return false;
        }

        self.data.fraction = fraction;
        self.data.last_split = Some(plane_index);
        self.data.surface = Some(SurfaceResult {
            index: surface_index,
            plane: surface.plane,
            flags: surface.flags,
            breakable_surface: surface.breakable_surface,
            material: surface.material
        });

        true
    }

    /// Attempts to commit a pending intersection, if any survived to the end of the query.
    fn try_commit_pending_result(&mut self) -> bool {
        let Some(pending) = self.pending else {
            return false;
        };
        self.try_commit_result(pending.fraction, pending.plane, Some(pending.surface))
    }

    fn push_node(&mut self, node: usize, front: bool) {
        let visit = NodeVisit { node: node as u32, front };
        if self.node_stack.len() < STACK_DEPTH {
            self.node_stack.push(visit);
        }
        else {
            self.node_stack[STACK_DEPTH - 1] = visit;
        }
    }
}
