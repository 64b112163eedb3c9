/// Quadtree of player positions
///
/// Spawn regions poll it for players inside their query rectangle (or
/// within a radius when they sit inside a building cell), and the default
/// npc manager asks it for the nearest player to a creature.
///
/// Coordinates are zone coordinates on the ground plane (x, z); the tree is
/// centred on the origin.
///
/// Time complexity:
/// - Insert/Remove: O(log n) average
/// - Query: O(log n + k) where k = results

/// Cells resolved by `cell_at` are the quadrants at this depth,
/// independent of how far the tree has actually subdivided.
pub const CELL_DEPTH: u32 = 4;

/// Axis-aligned rectangle on the ground plane
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub z: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, z: f32, width: f32, height: f32) -> Self {
        Self { x, z, width, height }
    }

    /// Square of edge `size` centred on the origin
    pub fn centered(size: f32) -> Self {
        Self::new(-size / 2.0, -size / 2.0, size, size)
    }

    #[inline]
    pub fn contains_point(&self, x: f32, z: f32) -> bool {
        x >= self.x && x < self.x + self.width && z >= self.z && z < self.z + self.height
    }

    #[inline]
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.x + other.width
            && self.x + self.width > other.x
            && self.z < other.z + other.height
            && self.z + self.height > other.z
    }

    #[inline]
    pub fn intersects_circle(&self, cx: f32, cz: f32, radius: f32) -> bool {
        let closest_x = cx.max(self.x).min(self.x + self.width);
        let closest_z = cz.max(self.z).min(self.z + self.height);
        let dx = cx - closest_x;
        let dz = cz - closest_z;
        (dx * dx + dz * dz) <= (radius * radius)
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.z + self.height / 2.0)
    }

    /// Quadrant index (NW=0, NE=1, SW=2, SE=3) holding the point
    fn quadrant(&self, x: f32, z: f32) -> u32 {
        let (cx, cz) = self.center();
        match (x >= cx, z >= cz) {
            (false, false) => 0,
            (true, false) => 1,
            (false, true) => 2,
            (true, true) => 3,
        }
    }

    fn child(&self, quadrant: u32) -> Rect {
        let half_width = self.width / 2.0;
        let half_height = self.height / 2.0;
        let (dx, dz) = match quadrant {
            0 => (0.0, 0.0),
            1 => (half_width, 0.0),
            2 => (0.0, half_height),
            _ => (half_width, half_height),
        };
        Rect::new(self.x + dx, self.z + dz, half_width, half_height)
    }
}

/// A tracked player position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerPoint {
    pub id: u64,
    pub x: f32,
    pub z: f32,
}

impl PlayerPoint {
    pub fn new(id: u64, x: f32, z: f32) -> Self {
        Self { id, x, z }
    }

    fn distance_sq(&self, x: f32, z: f32) -> f32 {
        let dx = self.x - x;
        let dz = self.z - z;
        dx * dx + dz * dz
    }
}

#[derive(Debug, Clone, Copy)]
pub struct QuadTreeConfig {
    /// Points per node before subdivision
    pub max_points: usize,
    pub max_depth: usize,
}

impl Default for QuadTreeConfig {
    fn default() -> Self {
        Self {
            max_points: 8,
            max_depth: 8,
        }
    }
}

pub struct QuadTree {
    bounds: Rect,
    points: Vec<PlayerPoint>,
    /// NW, NE, SW, SE
    children: Option<Box<[QuadTree; 4]>>,
    depth: usize,
    config: QuadTreeConfig,
}

impl QuadTree {
    pub fn new(bounds: Rect) -> Self {
        Self::with_config(bounds, QuadTreeConfig::default())
    }

    pub fn with_config(bounds: Rect, config: QuadTreeConfig) -> Self {
        Self::node(bounds, config, 0)
    }

    /// Tree covering a square zone of edge `size` centred on the origin
    pub fn for_zone(size: f32) -> Self {
        Self::new(Rect::centered(size))
    }

    fn node(bounds: Rect, config: QuadTreeConfig, depth: usize) -> Self {
        Self {
            bounds,
            points: Vec::new(),
            children: None,
            depth,
            config,
        }
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    fn subdivide(&mut self) {
        let bounds = self.bounds;
        let config = self.config;
        let depth = self.depth + 1;
        self.children = Some(Box::new([
            Self::node(bounds.child(0), config, depth),
            Self::node(bounds.child(1), config, depth),
            Self::node(bounds.child(2), config, depth),
            Self::node(bounds.child(3), config, depth),
        ]));

        for point in std::mem::take(&mut self.points) {
            self.insert_into_children(point);
        }
    }

    fn insert_into_children(&mut self, point: PlayerPoint) {
        if let Some(children) = &mut self.children {
            for child in children.iter_mut() {
                if child.bounds.contains_point(point.x, point.z) {
                    child.insert(point);
                    return;
                }
            }
        }
        // Float edge cases stay on the parent.
        self.points.push(point);
    }

    /// Insert a point; false when it lies outside the tree
    pub fn insert(&mut self, point: PlayerPoint) -> bool {
        if !self.bounds.contains_point(point.x, point.z) {
            return false;
        }

        if self.children.is_some() {
            self.insert_into_children(point);
            return true;
        }

        self.points.push(point);
        if self.points.len() > self.config.max_points && self.depth < self.config.max_depth {
            self.subdivide();
        }
        true
    }

    pub fn remove(&mut self, id: u64) -> bool {
        if let Some(index) = self.points.iter().position(|p| p.id == id) {
            self.points.swap_remove(index);
            return true;
        }

        if let Some(children) = &mut self.children {
            for child in children.iter_mut() {
                if child.remove(id) {
                    return true;
                }
            }
        }
        false
    }

    /// Move a point, inserting it if it was not tracked yet
    pub fn update(&mut self, point: PlayerPoint) -> bool {
        self.remove(point.id);
        self.insert(point)
    }

    pub fn query_rect(&self, rect: &Rect, results: &mut Vec<PlayerPoint>) {
        if !self.bounds.intersects(rect) {
            return;
        }

        results.extend(
            self.points
                .iter()
                .filter(|p| rect.contains_point(p.x, p.z))
                .copied(),
        );

        if let Some(children) = &self.children {
            for child in children.iter() {
                child.query_rect(rect, results);
            }
        }
    }

    pub fn query_radius(&self, x: f32, z: f32, radius: f32, results: &mut Vec<PlayerPoint>) {
        if !self.bounds.intersects_circle(x, z, radius) {
            return;
        }

        let radius_sq = radius * radius;
        results.extend(
            self.points
                .iter()
                .filter(|p| p.distance_sq(x, z) <= radius_sq)
                .copied(),
        );

        if let Some(children) = &self.children {
            for child in children.iter() {
                child.query_radius(x, z, radius, results);
            }
        }
    }

    /// Closest tracked point to (x, z)
    pub fn find_nearest(&self, x: f32, z: f32) -> Option<PlayerPoint> {
        let mut best = None;
        let mut best_dist_sq = f32::MAX;
        self.find_nearest_recursive(x, z, &mut best, &mut best_dist_sq);
        best
    }

    fn find_nearest_recursive(
        &self,
        x: f32,
        z: f32,
        best: &mut Option<PlayerPoint>,
        best_dist_sq: &mut f32,
    ) {
        if !self.bounds.intersects_circle(x, z, best_dist_sq.sqrt()) {
            return;
        }

        for point in &self.points {
            let dist_sq = point.distance_sq(x, z);
            if dist_sq < *best_dist_sq {
                *best_dist_sq = dist_sq;
                *best = Some(*point);
            }
        }

        if let Some(children) = &self.children {
            // Visit the quadrant holding the query point first to tighten the bound early.
            let first = self.bounds.quadrant(x, z) as usize;
            children[first].find_nearest_recursive(x, z, best, best_dist_sq);
            for (i, child) in children.iter().enumerate() {
                if i != first {
                    child.find_nearest_recursive(x, z, best, best_dist_sq);
                }
            }
        }
    }

    /// Id of the fixed-depth cell holding (x, z)
    ///
    /// Ids encode the quadrant path from the root (root = 1, child =
    /// parent * 4 + quadrant), so neighbouring regions in the same cell
    /// resolve to the same id.
    pub fn cell_at(&self, x: f32, z: f32) -> Option<u32> {
        if !self.bounds.contains_point(x, z) {
            return None;
        }
        let mut id = 1u32;
        let mut rect = self.bounds;
        for _ in 0..CELL_DEPTH {
            let quadrant = rect.quadrant(x, z);
            id = id * 4 + quadrant;
            rect = rect.child(quadrant);
        }
        Some(id)
    }

    pub fn count(&self) -> usize {
        let nested = self
            .children
            .as_ref()
            .map_or(0, |children| children.iter().map(QuadTree::count).sum());
        self.points.len() + nested
    }

    pub fn clear(&mut self) {
        self.points.clear();
        self.children = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(mut points: Vec<PlayerPoint>) -> Vec<u64> {
        let mut ids: Vec<u64> = points.drain(..).map(|p| p.id).collect();
        ids.sort_unstable();
        ids
    }

    #[test]
    fn test_rect_query_across_subdivision() {
        let mut tree = QuadTree::with_config(
            Rect::centered(1000.0),
            QuadTreeConfig { max_points: 2, max_depth: 6 },
        );
        for i in 0..20u64 {
            assert!(tree.insert(PlayerPoint::new(i, i as f32 * 10.0, -(i as f32) * 10.0)));
        }
        assert_eq!(tree.count(), 20);

        let mut found = Vec::new();
        tree.query_rect(&Rect::new(0.0, -45.0, 50.0, 50.0), &mut found);
        assert_eq!(ids(found), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_radius_query_and_update() {
        let mut tree = QuadTree::for_zone(1000.0);
        tree.insert(PlayerPoint::new(1, 50.0, 50.0));
        tree.insert(PlayerPoint::new(2, 55.0, 55.0));
        tree.insert(PlayerPoint::new(3, 90.0, 90.0));

        let mut found = Vec::new();
        tree.query_radius(50.0, 50.0, 10.0, &mut found);
        assert_eq!(ids(found), vec![1, 2]);

        tree.update(PlayerPoint::new(3, 48.0, 52.0));
        let mut found = Vec::new();
        tree.query_radius(50.0, 50.0, 10.0, &mut found);
        assert_eq!(ids(found), vec![1, 2, 3]);
        assert_eq!(tree.count(), 3);
    }

    #[test]
    fn test_out_of_bounds_rejected() {
        let mut tree = QuadTree::for_zone(100.0);
        assert!(!tree.insert(PlayerPoint::new(1, 80.0, 0.0)));
        assert_eq!(tree.cell_at(80.0, 0.0), None);
        assert!(!tree.remove(1));
    }

    #[test]
    fn test_nearest_point() {
        let mut tree = QuadTree::with_config(
            Rect::centered(1000.0),
            QuadTreeConfig { max_points: 1, max_depth: 5 },
        );
        tree.insert(PlayerPoint::new(1, -300.0, -300.0));
        tree.insert(PlayerPoint::new(2, 120.0, 80.0));
        tree.insert(PlayerPoint::new(3, 400.0, 400.0));
        assert_eq!(tree.find_nearest(100.0, 100.0).map(|p| p.id), Some(2));
        assert!(QuadTree::for_zone(10.0).find_nearest(0.0, 0.0).is_none());
    }

    #[test]
    fn test_cell_ids_are_stable() {
        let tree = QuadTree::for_zone(1024.0);
        let a = tree.cell_at(10.0, 10.0).unwrap();
        assert_eq!(tree.cell_at(20.0, 20.0), Some(a));
        assert_ne!(tree.cell_at(-10.0, 10.0), Some(a));
    }
}
