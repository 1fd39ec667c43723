/// Integer label attached to a mask pixel. 0 is background.
pub type Label = u32;

pub const BACKGROUND: Label = 0;

/// A `width * height` grid of labels, stored row-major.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelMap {
    width: u32,
    height: u32,
    labels: Vec<Label>,
}

impl LabelMap {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            labels: vec![BACKGROUND; width as usize * height as usize],
        }
    }

    /// Builds a map from explicit row-major labels. Returns `None` on a length mismatch.
    pub fn from_labels(width: u32, height: u32, labels: Vec<Label>) -> Option<Self> {
        (labels.len() == width as usize * height as usize).then_some(Self { width, height, labels })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Resizes (and clears) the map when the dimensions change. Returns `true` if it did.
    pub fn ensure_size(&mut self, width: u32, height: u32) -> bool {
        if (self.width, self.height) == (width, height) {
            return false;
        }
        self.width = width;
        self.height = height;
        self.labels.clear();
        self.labels.resize(width as usize * height as usize, BACKGROUND);
        true
    }

    pub fn clear(&mut self) {
        self.labels.fill(BACKGROUND);
    }

    #[inline]
    pub fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> Label {
        self.labels[self.index(x, y)]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, label: Label) {
        let index = self.index(x, y);
        self.labels[index] = label;
    }

    pub fn as_slice(&self) -> &[Label] {
        &self.labels
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [Label] {
        &mut self.labels
    }

    /// Number of distinct non-background labels.
    pub fn distinct_labels(&self) -> usize {
        let mut seen: Vec<Label> = self.labels.iter().copied().filter(|&l| l != BACKGROUND).collect();
        seen.sort_unstable();
        seen.dedup();
        seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_clears_and_tracks_dimensions() {
        let mut map = LabelMap::new(3, 3);
        map.set(1, 1, 7);
        assert!(!map.ensure_size(3, 3));
        assert_eq!(map.get(1, 1), 7);
        assert!(map.ensure_size(4, 2));
        assert_eq!(map.dimensions(), (4, 2));
        assert_eq!(map.as_slice().len(), 8);
        assert_eq!(map.distinct_labels(), 0);
    }

    #[test]
    fn counts_distinct_labels() {
        let map = LabelMap::from_labels(3, 2, vec![0, 4, 4, 9, 0, 2]).unwrap();
        assert_eq!(map.distinct_labels(), 3);
        assert!(LabelMap::from_labels(3, 2, vec![0; 5]).is_none());
    }
}
