//! Recovers surfaces lost to BSP leaks.
//!
//! A leak is a solid partition whose plane has no matching 2D reference in the leaf being
//! tested, so the intersection silently misses. The reference is usually not gone, just
//! misplaced: either the leaf references the surface under a nearly coplanar plane that an
//! ancestor partitioned on, or the reference sits in a leaf on the other side of an ancestor
//! partition (slivers cut by nearly coplanar planes). Both walks below are bounded by the
//! traversal's saved node stacks.

use log::debug;

use crate::collision_bsp::{BitVector, CollisionBsp};
use crate::surface::{search_leaf, surface_test3d};
use crate::test_vector::NodeStack;
use crate::vector::Vector3D;

/// How far apart two planes' normal components and offsets may sit while still being
/// considered the same partition.
pub const NEARLY_COPLANAR_EPSILON: f32 = 1e-4;

/// Attempts to recover the surface missed by a leak on `plane_index` in `leaf_index`.
///
/// Only meaningful when the leaf search came up empty on a plane dividing interior from
/// exterior. Any surface returned has passed the volumetric containment test against the
/// tested vector.
#[must_use]
#[expect(clippy::too_many_arguments)]
pub(crate) fn try_resolve_leak(
    bsp: &CollisionBsp,
    breakable_surfaces: &BitVector,
    node_stack: &NodeStack,
    interior_node_stack: &NodeStack,
    leaf_index: usize,
    plane_index: usize,
    origin: &Vector3D,
    delta: &Vector3D,
    fraction: f32
) -> Option<usize> {
    recover_with_ancestor_plane(
        bsp,
        breakable_surfaces,
        interior_node_stack,
        leaf_index,
        plane_index,
        origin,
        delta,
        fraction
    )
    .or_else(|| {
        recover_from_sibling_subtree(
            bsp,
            breakable_surfaces,
            node_stack,
            leaf_index,
            plane_index,
            origin,
            delta,
            fraction
        )
    })
}

/// The leaf may reference the surface under a nearly coplanar plane rather than the plane
/// actually crossed. Walk the ancestors of the last interior leaf from the deepest out and
/// retry the leaf search under each ancestor plane that is nearly coplanar with the crossed
/// one.
#[expect(clippy::too_many_arguments)]
fn recover_with_ancestor_plane(
    bsp: &CollisionBsp,
    breakable_surfaces: &BitVector,
    interior_node_stack: &NodeStack,
    leaf_index: usize,
    plane_index: usize,
    origin: &Vector3D,
    delta: &Vector3D,
    fraction: f32
) -> Option<usize> {
    let crossed = bsp.planes[plane_index];

    for visit in interior_node_stack.iter().rev() {
        let ancestor_plane = bsp.bsp3d_nodes[visit.node as usize].plane;
        if ancestor_plane == plane_index {
            continue;
        }
        if !bsp.planes[ancestor_plane].nearly_equal(crossed, NEARLY_COPLANAR_EPSILON) {
            continue;
        }

        let candidate = search_leaf(
            bsp,
            breakable_surfaces,
            leaf_index,
            ancestor_plane,
            false,
            origin,
            delta,
            fraction,
            None
        );
        if let Some(surface) = candidate {
            if surface_test3d(bsp, breakable_surfaces, surface, origin, delta) {
                debug!(
                    "leak on plane {plane_index} in leaf {leaf_index}: \
                     recovered surface {surface} under nearly coplanar plane {ancestor_plane}"
                );
                return Some(surface);
            }
        }
    }

    None
}

/// The reference may sit in a leaf on the other side of an ancestor partition. Walk the
/// current path from the deepest node out, re-descend from each ancestor's other child at
/// the intersection point, and retry the leaf search there under the ancestor's plane and
/// then the crossed plane. The walk ends at the first ancestor whose re-descent derives
/// the tested leaf again; no candidate higher up can be useful past that point.
#[expect(clippy::too_many_arguments)]
fn recover_from_sibling_subtree(
    bsp: &CollisionBsp,
    breakable_surfaces: &BitVector,
    node_stack: &NodeStack,
    leaf_index: usize,
    plane_index: usize,
    origin: &Vector3D,
    delta: &Vector3D,
    fraction: f32
) -> Option<usize> {
    let point = *origin + delta.scaled(fraction);

    for visit in node_stack.iter().rev() {
        let node = &bsp.bsp3d_nodes[visit.node as usize];
        let sibling = node.child(!visit.front);

        let Some(candidate_leaf) = bsp.leaf_for_point_from(sibling, &point) else {
            continue;
        };
        if candidate_leaf == leaf_index {
            break;
        }

        for candidate_plane in [node.plane, plane_index] {
            let candidate = search_leaf(
                bsp,
                breakable_surfaces,
                candidate_leaf,
                candidate_plane,
                false,
                origin,
                delta,
                fraction,
                None
            );
            if let Some(surface) = candidate {
                if surface_test3d(bsp, breakable_surfaces, surface, origin, delta) {
                    debug!(
                        "leak on plane {plane_index} in leaf {leaf_index}: \
                         recovered surface {surface} from sibling leaf {candidate_leaf}"
                    );
                    return Some(surface);
                }
            }
        }
    }

    None
}
