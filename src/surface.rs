//! Surface containment predicates and the per-leaf surface search.

use crate::collision_bsp::{BitVector, CollisionBsp, SurfaceFlags};
use crate::orientation::NextSurface;
use crate::vector::{ProjectionPlane, Vector2D, Vector3D};

/// Checks if a surface is breakable and broken.
///
/// A broken surface cannot be hit.
#[must_use]
pub fn surface_broken(
    bsp: &CollisionBsp,
    breakable_surfaces: &BitVector,
    surface_index: usize
) -> bool {
    let surface = &bsp.surfaces[surface_index];

    surface.flags.contains(SurfaceFlags::BREAKABLE)
        && (surface.breakable_surface as usize) < breakable_surfaces.count
        && !breakable_surfaces.test(surface.breakable_surface as usize)
}

/// Tests if `point` is on a surface projected onto a cardinal plane.
///
/// The edges of the surface must form a convex polygon when projected onto `plane`.
/// `forward` must be `true` if and only if `plane` is forward-facing with respect to the
/// normal of the source plane. A missing or broken surface is never hit.
#[must_use]
pub fn surface_test2d(
    bsp: &CollisionBsp,
    breakable_surfaces: &BitVector,
    surface: Option<usize>,
    plane: ProjectionPlane,
    forward: bool,
    point: &Vector2D
) -> bool {
    let Some(surface_index) = surface else {
        return false;
    };

    if surface_broken(bsp, breakable_surfaces, surface_index) {
        return false;
    }

    let first_edge = bsp.surfaces[surface_index].first_edge;

    // To test if point is in the bounds of the surface (post-projection), the game assumes
    // the surface is convex and checks if point is on the surface-side of each edge. This is
    // done by computing a determinant. Don't let anyone tell you that you need to normalize
    // to do this test.
    let mut next_edge = first_edge;
    loop {
        let edge = &bsp.edges[next_edge];

        let start = &bsp.vertices[edge.first_vertex(surface_index)];
        let end = &bsp.vertices[edge.next_vertex(surface_index)];

        let p0 = start.point.projected(plane, forward);
        let p1 = end.point.projected(plane, forward);

        let point_delta = *point - p0;
        let edge_delta = p1 - p0;

        // Argument order preserved from the game.
        let determinant = point_delta.det_wide(edge_delta);
        if determinant > 0.0 {
            return false; // point is outside of surface
        }

        next_edge = edge.next_edge(surface_index);
        if next_edge == first_edge {
            break;
        }
    }

    true
}

/// Tests if the vector `origin..origin + delta` passes through a surface, without projection.
///
/// The game has no counterpart to this test; the mitigations use it to validate candidates
/// the sealed-world assumption would otherwise accept or miss. It must not gate ordinary
/// hits: a partitioning plane can legitimately report a surface whose polygon lies in a
/// neighbouring leaf, and rejecting those punches holes into the world.
#[must_use]
pub fn surface_test3d(
    bsp: &CollisionBsp,
    breakable_surfaces: &BitVector,
    surface_index: usize,
    origin: &Vector3D,
    delta: &Vector3D
) -> bool {
    if surface_broken(bsp, breakable_surfaces, surface_index) {
        return false;
    }

    let first_edge_index = bsp.surfaces[surface_index].first_edge;
    let first_edge = &bsp.edges[first_edge_index];

    let mut last_vertex = bsp.vertices[first_edge.first_vertex(surface_index)].point - *origin;

    // The vector passes through the polygon iff the triple products about the fan all carry
    // the same sign.
    let mut all_signed = true;
    let mut all_unsigned = true;
    let mut next_edge_index = first_edge_index;
    loop {
        let edge = &bsp.edges[next_edge_index];
        let vertex = bsp.vertices[edge.next_vertex(surface_index)].point - *origin;

        let volume = delta.dot_wide(&last_vertex.cross_product_wide(vertex));
        all_signed &= volume <= 0.0;
        all_unsigned &= volume >= 0.0;

        next_edge_index = edge.next_edge(surface_index);
        last_vertex = vertex;
        if next_edge_index == first_edge_index {
            break;
        }
    }

    all_signed || all_unsigned
}

/// Searches a leaf for the surface intersected on a partitioning plane.
///
/// The point tested is `origin + fraction * delta` and must lie on the plane at
/// `plane_index`. If `splits_interior` is `true`, the plane divides two BSP interior leaves
/// and a candidate must pass the projected containment test; otherwise the sealed-world
/// assumption accepts the candidate as-is.
///
/// `expected_front` enables the next-surface corroboration pass: a candidate that fails the
/// projected containment test is still accepted if re-walking the BSP past the intersection
/// does not contradict the expected surface orientation. Supply `None` to leave candidates
/// to the caller's deferred-commit policy instead.
///
/// Returns `None` if no reference matches the plane or no candidate is accepted. On a plane
/// dividing interior from exterior, `None` is a BSP leak, violating the sealed-world
/// property.
#[must_use]
#[expect(clippy::too_many_arguments)]
pub fn search_leaf(
    bsp: &CollisionBsp,
    breakable_surfaces: &BitVector,
    leaf_index: usize,
    plane_index: usize,
    splits_interior: bool,
    origin: &Vector3D,
    delta: &Vector3D,
    fraction: f32,
    expected_front: Option<bool>
) -> Option<usize> {
    let point = *origin + delta.scaled(fraction);

    let leaf = &bsp.leaves[leaf_index];

    // Compute an implicit 2D cardinal basis for the plane (respecting RH coordinates).
    // If projection_inverted is true, then the signs of the basis vectors are flipped.
    let plane = bsp.planes[plane_index];
    let projection_plane = ProjectionPlane::for_normal(&plane.vector);
    let projection_inverted = plane.vector.component(projection_plane as usize) <= 0.0;

    for reference in &bsp.bsp2d_references[leaf.reference_range()] {
        // A plane dividing interior from exterior with no matching reference in this leaf is
        // a BSP leak.
        if reference.plane.index() != plane_index {
            continue;
        }

        // Project the point onto projection_plane, respecting the relative direction of the
        // reference plane.
        let forward = projection_inverted == reference.plane.inverted();
        let projection = point.projected(projection_plane, forward);

        let surface = bsp.surface_for_point(reference.root, &projection);

        // When the plane divides interior from exterior, the sealed-world property implies
        // the surface spans the whole leaf face, so the candidate is accepted without
        // looking at the surface polygon. Phantom BSP happens exactly where that
        // assumption fails.
        if !splits_interior {
            return surface;
        }
        if surface_test2d(bsp, breakable_surfaces, surface, projection_plane, forward, &projection) {
            return surface;
        }
        if let Some(expect_front) = expected_front {
            if next_surface_confirms(bsp, plane_index, origin, delta, fraction, expect_front) {
                return surface;
            }
        }
    }

    None
}

/// Corroborates a candidate that failed projected containment by looking at the orientation
/// of the next surface along the vector.
fn next_surface_confirms(
    bsp: &CollisionBsp,
    plane_index: usize,
    origin: &Vector3D,
    delta: &Vector3D,
    fraction: f32,
    expect_front: bool
) -> bool {
    let next = bsp.next_surface_orientation(origin, delta, fraction, plane_index);

    if expect_front {
        // An intact surface here would be followed by a back-facing one.
        next != NextSurface::FrontFacing
    }
    else {
        next != NextSurface::BackFacing
    }
}
