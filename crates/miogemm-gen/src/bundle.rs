//! Bundle assembly: which kernels an assignment needs, in enqueue order.

use serde::{Deserialize, Serialize};

use miogemm_core::{derive, Chi, DerivedParams, DevInfo, Geometry, GraphRole, HyPas, MiogError};

use crate::byline;
use crate::kernelstring::{KernelString, KernelType};
use crate::main_kernel;

/// The kernels jointly implementing one assignment's GEMM, with their
/// derived parameters.
///
/// Kernels are stored in a valid enqueue order: preparation kernels first,
/// the main kernel last. [`Bundle::prerequisites`] exposes the in-bundle
/// dependency edges for drivers that overlap the unordered prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    /// Geometry the bundle was generated for.
    pub geometry: Geometry,
    /// Hyperparameters realised by the bundle.
    pub hypas: HyPas,
    /// Derived parameters shared by all kernels of the bundle.
    pub derived: DerivedParams,
    /// Emitted kernels, preparation first.
    pub kernels: Vec<KernelString>,
}

impl Bundle {
    /// Derives the parameters and emits every required kernel.
    ///
    /// Emission conditions: workspace stagers when the respective role
    /// stages through the workspace, the beta-scale kernel when the main
    /// kernel splits k and cannot scale C itself, the main kernel always.
    pub fn generate(gg: &Geometry, devinfo: &DevInfo, hp: &HyPas) -> Result<Self, MiogError> {
        let dp = derive(gg, devinfo, hp).map_err(MiogError::Derive)?;

        let mut kernels = Vec::with_capacity(4);
        if hp.chi(GraphRole::A, Chi::Wos) > 0 {
            kernels.push(byline::ws_kernel(
                gg,
                GraphRole::A,
                hp.chi(GraphRole::A, Chi::Wos),
                dp.access_a.ws_offset_elements,
            ));
        }
        if hp.chi(GraphRole::B, Chi::Wos) > 0 {
            kernels.push(byline::ws_kernel(
                gg,
                GraphRole::B,
                hp.chi(GraphRole::B, Chi::Wos),
                dp.access_b.ws_offset_elements,
            ));
        }
        if !dp.beta_in_main {
            kernels.push(byline::betac_kernel(gg));
        }
        kernels.push(main_kernel::main_kernel(gg, hp, &dp));

        Ok(Self {
            geometry: gg.clone(),
            hypas: hp.clone(),
            derived: dp,
            kernels,
        })
    }

    /// The kernel of the given type, if the bundle contains one.
    pub fn kernel(&self, ktype: KernelType) -> Option<&KernelString> {
        self.kernels.iter().find(|k| k.ktype == ktype)
    }

    /// Indices of the kernels that must complete before `index` may run.
    pub fn prerequisites(&self, index: usize) -> Vec<usize> {
        let deps = self.kernels[index].ktype.dependencies();
        self.kernels
            .iter()
            .enumerate()
            .filter(|(_, k)| deps.contains(&k.ktype))
            .map(|(i, _)| i)
            .collect()
    }
}
