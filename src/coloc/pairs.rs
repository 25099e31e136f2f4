use ndarray::ArrayView3;

/// Restartable sequence of `(a, b)` voxel pairs where `mask` is set, visited
/// in row-major `(z, y, x)` order.
pub struct MaskedPairs<'a, T> {
    a: ArrayView3<'a, T>,
    b: ArrayView3<'a, T>,
    mask: ArrayView3<'a, bool>,
    dim: (usize, usize, usize),
    pos: usize,
}

impl<'a, T: Copy> MaskedPairs<'a, T> {
    /// Panics if the three volumes differ in shape.
    pub fn new(a: ArrayView3<'a, T>, b: ArrayView3<'a, T>, mask: ArrayView3<'a, bool>) -> Self {
        assert_eq!(a.dim(), b.dim(), "paired volumes differ in shape");
        assert_eq!(a.dim(), mask.dim(), "mask differs in shape from the volumes");
        let dim = a.dim();
        MaskedPairs {
            a,
            b,
            mask,
            dim,
            pos: 0,
        }
    }

    pub fn restart(&mut self) {
        self.pos = 0;
    }

    fn len(&self) -> usize {
        self.dim.0 * self.dim.1 * self.dim.2
    }

    fn index(&self, pos: usize) -> [usize; 3] {
        let (_, ny, nx) = self.dim;
        [pos / (ny * nx), (pos / nx) % ny, pos % nx]
    }
}

impl<T: Copy> Iterator for MaskedPairs<'_, T> {
    type Item = (T, T);

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos < self.len() {
            let idx = self.index(self.pos);
            self.pos += 1;
            if self.mask[idx] {
                return Some((self.a[idx], self.b[idx]));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_order_and_restart() {
        let a = Array3::from_shape_fn((2, 2, 3), |(z, y, x)| (z * 100 + y * 10 + x) as u32);
        let b = a.mapv(|v| v + 1000);
        let mask = Array3::from_shape_fn((2, 2, 3), |(z, y, x)| (z + y + x) % 2 == 0);

        let mut pairs = MaskedPairs::new(a.view(), b.view(), mask.view());
        let first: Vec<(u32, u32)> = pairs.by_ref().collect();
        assert_eq!(
            first,
            vec![(0, 1000), (2, 1002), (11, 1011), (101, 1101), (110, 1110), (112, 1112)]
        );
        assert_eq!(pairs.next(), None);

        pairs.restart();
        let second: Vec<(u32, u32)> = pairs.collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_mask() {
        let a = Array3::<f32>::ones((2, 3, 3));
        let mask = Array3::from_elem((2, 3, 3), false);
        let mut pairs = MaskedPairs::new(a.view(), a.view(), mask.view());
        assert_eq!(pairs.next(), None);
    }

    #[test]
    #[should_panic]
    fn test_shape_mismatch_panics() {
        let a = Array3::<f32>::ones((2, 3, 3));
        let b = Array3::<f32>::ones((2, 3, 4));
        let mask = Array3::from_elem((2, 3, 3), true);
        MaskedPairs::new(a.view(), b.view(), mask.view());
    }
}
