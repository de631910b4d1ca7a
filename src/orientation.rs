//! Re-walks the BSP ahead of an intersection to classify the next surface's orientation.

use crate::collision_bsp::{Bsp3dChild, Bsp3dRef, CollisionBsp, LeafType};
use crate::vector::Vector3D;

/// The orientation of the next surface encountered along a vector.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum NextSurface {
    /// The next surface faces the vector origin.
    FrontFacing,
    /// No further surface is encountered.
    NoSurface,
    /// The next surface faces away from the vector origin.
    BackFacing
}

struct ProbeContext<'a, 'b> {
    bsp: &'b CollisionBsp<'a>,
    origin: &'b Vector3D,
    delta: &'b Vector3D,
    /// 2D references on this plane are dropped from the probe.
    plane_ignore: usize,

    leaf: Option<usize>,
    leaf_type: LeafType,
    plane: Option<usize>
}

impl<'a> CollisionBsp<'a> {
    /// Walks the BSP from `fraction` along `delta` and reports the orientation of the next
    /// solid partition encountered, ignoring any 2D reference on `plane_ignore`.
    ///
    /// Unlike a full intersection test, the walk is unbounded past `fraction` and stops at
    /// the first leaf transition that reveals a solid partition. No surface polygon is
    /// consulted; a plane reference in the tested leaf is taken as evidence that some
    /// surface, any surface, would be hit there.
    #[must_use]
    pub fn next_surface_orientation(
        &self,
        origin: &Vector3D,
        delta: &Vector3D,
        fraction: f32,
        plane_ignore: usize
    ) -> NextSurface {
        let mut ctx = ProbeContext {
            bsp: self,
            origin,
            delta,
            plane_ignore,
            leaf: None,
            leaf_type: LeafType::None,
            plane: None
        };

        ctx.probe_node(Bsp3dRef::node(0), fraction)
    }
}

impl<'a, 'b> ProbeContext<'a, 'b> {
    fn probe_node(&mut self, root: Bsp3dRef, fraction: f32) -> NextSurface {
        let node_index = match root.decode() {
            Bsp3dChild::Node(index) => index,
            Bsp3dChild::Leaf(leaf) => return self.probe_leaf(Some(leaf)),
            Bsp3dChild::Exterior => return self.probe_leaf(None)
        };

        let node = &self.bsp.bsp3d_nodes[node_index];
        let plane = self.bsp.planes[node.plane];

        // The interval under test runs from `fraction` out to infinity, so the far side of
        // the plane is decided by the sign of the direction alone.
        let test_origin = plane.distance_to_point(*self.origin);
        let dot_delta = self.delta.dot_wide(&plane.vector);
        let point_test = test_origin + fraction as f64 * dot_delta;
        let any_before = point_test < 0.0 || dot_delta < 0.0;
        let any_after = point_test >= 0.0 || dot_delta >= 0.0;

        if !any_before || !any_after {
            return self.probe_node(node.child(any_after), fraction);
        }

        // true iff the plane normal faces the vector direction
        let plane_faces_forward = dot_delta < 0.0;
        let first_child = node.child(plane_faces_forward);
        let second_child = node.child(!plane_faces_forward);
        let intersection = (-(test_origin / dot_delta)) as f32;

        let result = self.probe_node(first_child, fraction);
        if result != NextSurface::NoSurface {
            return result;
        }

        self.plane = Some(node.plane);
        self.probe_node(second_child, intersection)
    }

    fn probe_leaf(&mut self, leaf: Option<usize>) -> NextSurface {
        let leaf_type = self.bsp.classify_leaf(leaf);

        // Double-sided transitions are skipped on purpose; the probe reports only proper
        // interior-exterior splits.
        let (tested_leaf, direction) = if self.leaf_type.is_interior() && leaf_type == LeafType::Exterior {
            (self.leaf, NextSurface::FrontFacing)
        }
        else if self.leaf_type == LeafType::Exterior && leaf_type.is_interior() {
            (leaf, NextSurface::BackFacing)
        }
        else {
            (None, NextSurface::NoSurface)
        };

        if let (Some(tested_leaf), Some(plane)) = (tested_leaf, self.plane) {
            if plane != self.plane_ignore && leaf_references_plane(self.bsp, tested_leaf, plane) {
                return direction;
            }
        }

        self.leaf = leaf;
        self.leaf_type = leaf_type;

        NextSurface::NoSurface
    }
}

/// Checks if a BSP leaf carries a 2D reference on the given plane.
fn leaf_references_plane(bsp: &CollisionBsp, leaf_index: usize, plane_index: usize) -> bool {
    let leaf = &bsp.leaves[leaf_index];
    bsp.bsp2d_references[leaf.reference_range()]
        .iter()
        .any(|reference| reference.plane.index() == plane_index)
}
