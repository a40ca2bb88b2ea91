//! Distributed vectors with ghost (halo) entries.
//!
//! Each rank owns a contiguous block `[start, end)` of the global index space
//! and keeps read-only copies of a few remote entries (its ghosts) that the
//! local part of an operator needs. Local storage is the owned block followed
//! by the ghosts in increasing global order.
//!
//! Ghosts go stale as soon as an owner changes its values; a
//! [`GhostUpdate::ghost_update`] through [`DistributedInnerProduct`] refreshes
//! them. Inner products read owned entries only, so they never see ghosts.
//!
//! The exchange plan is fixed when the layout is built. The halo is the sorted
//! union of every rank's ghost indices; since ownership blocks are contiguous
//! and in rank order, each owner publishes its slice of the halo and one
//! all-gather of those slices yields the whole halo in order. An update moves
//! as many entries as there are distinct ghosts, never the whole vector.

use std::sync::Arc;

use num_traits::Float;

use crate::core::traits::{GhostUpdate, InnerProduct, LocalStorage, VectorOps};
use crate::core::wrappers::{slice_axpy, slice_aypx, slice_dot};
use crate::error::KError;
use crate::parallel::Comm;

/// Ownership and ghost map of one rank's part of a distributed vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GhostLayout {
    rank: usize,
    /// `offsets[q]..offsets[q + 1]` is the block owned by rank `q`.
    offsets: Vec<usize>,
    /// Global indices of the ghosts, sorted, none of them owned.
    ghosts: Vec<usize>,
    /// Owned entries (local positions) other ranks hold as ghosts, in global order.
    published: Vec<usize>,
    /// Position of each ghost in the gathered halo.
    ghost_sources: Vec<usize>,
    halo_len: usize,
}

impl GhostLayout {
    /// Collectively build a layout from each rank's owned length and ghosts.
    ///
    /// Both collectives run before a rank validates its own ghosts; an invalid
    /// ghost list fails only on its rank and is left out of everyone's halo
    /// plan.
    pub fn new<C: Comm>(comm: &C, owned_len: usize, mut ghosts: Vec<usize>) -> Result<Self, KError> {
        let sizes = comm.all_gather_sizes(owned_len);
        let mut offsets = Vec::with_capacity(sizes.len() + 1);
        offsets.push(0);
        for s in sizes {
            let last = offsets[offsets.len() - 1];
            offsets.push(last + s);
        }
        ghosts.sort_unstable();
        ghosts.dedup();

        let requested: Vec<f64> = ghosts.iter().map(|&g| g as f64).collect();
        let mut all_requested = Vec::new();
        comm.all_gather_varcount(&requested, &mut all_requested)?;
        let global = offsets[offsets.len() - 1];
        let mut halo: Vec<usize> = all_requested.into_iter().map(|g| g as usize).filter(|&g| g < global).collect();
        halo.sort_unstable();
        halo.dedup();

        Self::with_halo(comm.rank(), offsets, ghosts, &halo)
    }

    /// Layout owning the whole index space on a single rank.
    pub fn serial(len: usize) -> Self {
        GhostLayout {
            rank: 0,
            offsets: vec![0, len],
            ghosts: Vec::new(),
            published: Vec::new(),
            ghost_sources: Vec::new(),
            halo_len: 0,
        }
    }

    fn with_halo(rank: usize, offsets: Vec<usize>, ghosts: Vec<usize>, halo: &[usize]) -> Result<Self, KError> {
        let mut layout = GhostLayout {
            rank,
            offsets,
            ghosts,
            published: Vec::new(),
            ghost_sources: Vec::new(),
            halo_len: halo.len(),
        };
        let global = layout.global_len();
        let owned = layout.owned_range();
        for &g in &layout.ghosts {
            if g >= global {
                return Err(KError::mismatch("ghost index bound", global, g));
            }
            if owned.contains(&g) {
                return Err(KError::Unsupported("ghost index refers to an owned entry"));
            }
        }
        layout.published = halo.iter().filter(|&&g| owned.contains(&g)).map(|&g| g - owned.start).collect();
        layout.ghost_sources = layout
            .ghosts
            .iter()
            .map(|g| halo.binary_search(g).map_err(|_| KError::CommError(format!("ghost {g} missing from the halo"))))
            .collect::<Result<_, _>>()?;
        Ok(layout)
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn global_len(&self) -> usize {
        self.offsets[self.offsets.len() - 1]
    }

    pub fn owned_range(&self) -> std::ops::Range<usize> {
        self.offsets[self.rank]..self.offsets[self.rank + 1]
    }

    pub fn owned_len(&self) -> usize {
        self.owned_range().len()
    }

    pub fn ghosts(&self) -> &[usize] {
        &self.ghosts
    }

    /// Number of entries one ghost update gathers on every rank.
    pub fn halo_len(&self) -> usize {
        self.halo_len
    }

    /// Owned entries plus ghosts.
    pub fn local_len(&self) -> usize {
        self.owned_len() + self.ghosts.len()
    }

    /// Position of global index `g` in local storage, if it is owned or a ghost.
    pub fn local_index(&self, g: usize) -> Option<usize> {
        let owned = self.owned_range();
        if owned.contains(&g) {
            return Some(g - owned.start);
        }
        self.ghosts
            .binary_search(&g)
            .ok()
            .map(|k| self.owned_len() + k)
    }
}

/// A vector partitioned across ranks, with ghost copies of remote entries.
#[derive(Debug, Clone)]
pub struct DistVector<T> {
    layout: Arc<GhostLayout>,
    data: Vec<T>,
}

impl<T: Float> DistVector<T> {
    pub fn zeros(layout: Arc<GhostLayout>) -> Self {
        let data = vec![T::zero(); layout.local_len()];
        DistVector { layout, data }
    }

    /// Build from owned values; ghosts start at zero until the first ghost update.
    pub fn from_owned(layout: Arc<GhostLayout>, owned: Vec<T>) -> Result<Self, KError> {
        if owned.len() != layout.owned_len() {
            return Err(KError::mismatch("owned entries", layout.owned_len(), owned.len()));
        }
        let mut data = owned;
        data.resize(layout.local_len(), T::zero());
        Ok(DistVector { layout, data })
    }

    /// Fill owned entries from a function of the global index.
    pub fn from_fn(layout: Arc<GhostLayout>, f: impl Fn(usize) -> T) -> Self {
        let mut v = Self::zeros(layout);
        let start = v.layout.owned_range().start;
        for (k, vk) in v.owned_mut().iter_mut().enumerate() {
            *vk = f(start + k);
        }
        v
    }

    pub fn layout(&self) -> &Arc<GhostLayout> {
        &self.layout
    }

    pub fn owned(&self) -> &[T] {
        &self.data[..self.layout.owned_len()]
    }

    pub fn owned_mut(&mut self) -> &mut [T] {
        let n = self.layout.owned_len();
        &mut self.data[..n]
    }

    pub fn ghost_values(&self) -> &[T] {
        &self.data[self.layout.owned_len()..]
    }

    /// Value at global index `g` if it is owned or a ghost here.
    pub fn get_global(&self, g: usize) -> Option<T> {
        self.layout.local_index(g).map(|l| self.data[l])
    }
}

impl<T> LocalStorage<T> for DistVector<T> {
    fn local(&self) -> &[T] {
        &self.data
    }
    fn local_mut(&mut self) -> &mut [T] {
        &mut self.data
    }
}

impl<T: Float + Send + Sync> VectorOps<T> for DistVector<T> {
    fn global_len(&self) -> usize {
        self.layout.global_len()
    }
    fn compatible(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.layout, &other.layout) || *self.layout == *other.layout
    }
    fn axpy(&mut self, alpha: T, x: &Self) {
        slice_axpy(self.owned_mut(), alpha, x.owned());
    }
    fn aypx(&mut self, beta: T, x: &Self) {
        slice_aypx(self.owned_mut(), beta, x.owned());
    }
    fn copy_from(&mut self, x: &Self) {
        self.data.copy_from_slice(&x.data);
    }
    fn set_zero(&mut self) {
        self.data.iter_mut().for_each(|v| *v = T::zero());
    }
}

/// Collective inner product and ghost exchange over a communicator.
///
/// Local partial sums are accumulated in `T` and reduced across ranks as `f64`.
pub struct DistributedInnerProduct<'a, C: Comm> {
    /// Reference to the communicator implementing the `Comm` trait.
    pub comm: &'a C,
}

impl<'a, C: Comm> DistributedInnerProduct<'a, C> {
    pub fn new(comm: &'a C) -> Self {
        Self { comm }
    }

    /// Gather the owned blocks of all ranks into one global vector (on every rank).
    pub fn gather<T: Float>(&self, v: &DistVector<T>) -> Result<Vec<T>, KError> {
        let local: Vec<f64> = v.owned().iter().map(|x| x.to_f64().unwrap_or(f64::NAN)).collect();
        let mut global = Vec::with_capacity(v.layout.global_len());
        self.comm.all_gather_varcount(&local, &mut global)?;
        if global.len() != v.layout.global_len() {
            return Err(KError::mismatch("gathered vector", v.layout.global_len(), global.len()));
        }
        Ok(global.into_iter().map(|x| T::from(x).unwrap_or_else(T::nan)).collect())
    }
}

impl<C: Comm, T: Float + Send + Sync> InnerProduct<DistVector<T>> for DistributedInnerProduct<'_, C> {
    type Scalar = T;
    fn dot(&self, x: &DistVector<T>, y: &DistVector<T>) -> T {
        let local = slice_dot(x.owned(), y.owned());
        let global = self.comm.all_reduce(local.to_f64().unwrap_or(f64::NAN));
        T::from(global).unwrap_or_else(T::nan)
    }
}

impl<C: Comm, T: Float + Send + Sync> GhostUpdate<DistVector<T>> for DistributedInnerProduct<'_, C> {
    fn ghost_update(&self, v: &mut DistVector<T>) -> Result<(), KError> {
        let layout = Arc::clone(&v.layout);
        let published: Vec<f64> =
            layout.published.iter().map(|&l| v.data[l].to_f64().unwrap_or(f64::NAN)).collect();
        let mut halo = Vec::with_capacity(layout.halo_len);
        self.comm.all_gather_varcount(&published, &mut halo)?;
        if halo.len() != layout.halo_len {
            return Err(KError::mismatch("gathered halo", layout.halo_len, halo.len()));
        }
        let n = layout.owned_len();
        for (slot, &k) in v.data[n..].iter_mut().zip(&layout.ghost_sources) {
            *slot = T::from(halo[k]).unwrap_or_else(T::nan);
        }
        Ok(())
    }
}
