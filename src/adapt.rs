//! Adaptation control: estimator selection, field lifecycle across
//! adaptation steps and invocation of the external mesh modification step.

use crate::{
    field::{ErrorField, VertexSizeField},
    mesh::{CavityMesh, Mesh},
    parallel::Reduction,
    size::{self, SizeParams},
    Error, Result,
};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Instant;

/// Which estimator feeds the sizing pipeline
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// Recovery-based (SPR) indicator derived from the solution gradient
    Spr,
    /// Bounded indicator of the first VMS estimator
    Vms1,
    /// Bounded indicator of the second VMS estimator
    Vms2,
    /// Pointwise minimum of the three estimator size fields
    Min,
}

impl FromStr for Method {
    type Err = Box<dyn std::error::Error>;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "spr" => Ok(Self::Spr),
            "vms1" => Ok(Self::Vms1),
            "vms2" => Ok(Self::Vms2),
            "min" => Ok(Self::Min),
            _ => Err(Error::from(&format!("unknown adaptation method: {s}"))),
        }
    }
}

/// Discretization fields that become stale once the mesh changes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldTag {
    /// Primal solution
    Primal,
    /// Dual (adjoint) solution
    Dual,
    /// Functional error contribution of the first VMS estimator
    Functional1,
    /// Functional error contribution of the second VMS estimator
    Functional2,
    /// Bounded indicator of the first VMS estimator
    FunctionalBound1,
    /// Bounded indicator of the second VMS estimator
    FunctionalBound2,
}

impl FieldTag {
    /// Fields destroyed before every mesh modification
    pub const STALE: [Self; 6] = [
        Self::Primal,
        Self::Dual,
        Self::Functional1,
        Self::Functional2,
        Self::FunctionalBound1,
        Self::FunctionalBound2,
    ];
}

/// Access to the discretization owning the mesh and the estimator outputs.
///
/// The accessors transfer ownership of the returned fields to the caller;
/// a second call returns `None` until the estimator runs again.
pub trait Discretization {
    /// Mesh type of the local shard
    type Mesh: CavityMesh;

    /// The mesh shard of the local rank
    fn mesh(&mut self) -> &mut Self::Mesh;

    /// Take the bounded error indicator of the first VMS estimator
    fn vms_error_1(&mut self) -> Option<ErrorField>;

    /// Take the bounded error indicator of the second VMS estimator
    fn vms_error_2(&mut self) -> Option<ErrorField>;

    /// Take the per-element indicator derived from the recovered solution
    /// gradient; the gradient intermediate is dropped by the callee
    fn recovered_error(&mut self) -> Option<ErrorField>;

    /// Write a mesh/field snapshot tagged with the adaptation step
    fn write_snapshot(&mut self, step: usize) -> Result<()>;

    /// Destroy a stale field if it is present
    fn destroy_field(&mut self, tag: FieldTag);

    /// Rebuild the structures that depend on the modified mesh
    fn update(&mut self) -> Result<()>;
}

/// Configuration handed to the mesh modification step
#[derive(Clone, Copy, Debug)]
pub struct ModificationParams {
    /// Number of modification iterations
    pub max_iterations: u32,
    /// Allow coarsening (elements may grow as well as shrink)
    pub coarsen: bool,
}

impl Default for ModificationParams {
    fn default() -> Self {
        Self {
            max_iterations: 1,
            coarsen: true,
        }
    }
}

/// The external mesh modification step
pub trait MeshModification<M: Mesh> {
    /// Run local conforming edits (splits, collapses, swaps) towards the
    /// vertex target sizes; the size field is consumed and destroyed by
    /// the modification step
    fn adapt(
        &mut self,
        mesh: &mut M,
        size: VertexSizeField,
        params: &ModificationParams,
    ) -> Result<()>;

    /// Subdivide every element according to the uniform pattern of its
    /// dimension
    fn uniform_refine(&mut self, mesh: &mut M) -> Result<()>;
}

/// Summary of one adaptation step
#[derive(Clone, Debug, Serialize)]
pub struct StepInfo {
    /// Step index
    pub step: usize,
    /// Estimator method, `None` for uniform refinement
    pub method: Option<Method>,
    /// Element count before the modification
    pub n_elems_init: usize,
    /// Element count after the modification
    pub n_elems_final: usize,
    /// Wall clock time in seconds
    pub time: f64,
}

impl StepInfo {
    /// Serialize to pretty-printed JSON
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap()
    }
}

/// Drives the adaptation cycle: estimator selection, size field
/// computation, stale field lifecycle and invocation of the mesh
/// modification step.
pub struct Adapter<C: Reduction, R> {
    method: Method,
    params: SizeParams,
    comm: C,
    modifier: R,
}

impl<C: Reduction, R> Adapter<C, R> {
    #[must_use]
    pub const fn new(method: Method, params: SizeParams, comm: C, modifier: R) -> Self {
        Self {
            method,
            params,
            comm,
            modifier,
        }
    }

    /// The configured estimator method
    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// Size field from the recovered solution gradient
    fn spr_size<D>(&self, disc: &mut D, target: usize, name: &str) -> Result<VertexSizeField>
    where
        D: Discretization,
    {
        let Some(error) = disc.recovered_error() else {
            return Err(Error::from("no recovered gradient indicator available"));
        };
        Ok(size::iso_target_size(
            disc.mesh(),
            &self.comm,
            error,
            target,
            self.params,
            name,
        ))
    }

    /// Size field from a bounded VMS indicator
    fn vms_size<D>(
        &self,
        disc: &mut D,
        error: Option<ErrorField>,
        target: usize,
        name: &str,
    ) -> Result<VertexSizeField>
    where
        D: Discretization,
    {
        let Some(error) = error else {
            return Err(Error::from("no bounded VMS indicator available"));
        };
        Ok(size::iso_target_size(
            disc.mesh(),
            &self.comm,
            error,
            target,
            self.params,
            name,
        ))
    }

    /// Compute the target vertex size field for the configured method
    fn target_size<D>(&self, disc: &mut D, target: usize) -> Result<VertexSizeField>
    where
        D: Discretization,
    {
        match self.method {
            Method::Spr => {
                info!("using spr size field");
                self.spr_size(disc, target, "size")
            }
            Method::Vms1 => {
                info!("using vms 1 size field");
                let error = disc.vms_error_1();
                self.vms_size(disc, error, target, "size")
            }
            Method::Vms2 => {
                info!("using vms 2 size field");
                let error = disc.vms_error_2();
                self.vms_size(disc, error, target, "size")
            }
            Method::Min => {
                info!("using min size field");
                let error = disc.vms_error_1();
                let s1 = self.vms_size(disc, error, target, "size1")?;
                let error = disc.vms_error_2();
                let s2 = self.vms_size(disc, error, target, "size2")?;
                let s3 = self.spr_size(disc, target, "size")?;
                Ok(size::min_size_field(s1, s2, s3))
            }
        }
    }

    /// One adaptation step: select the estimator and compute the size
    /// field, snapshot the state, destroy the stale fields and hand the
    /// mesh to a single modification pass with coarsening enabled
    pub fn adapt<D>(&mut self, disc: &mut D, target: usize, step: usize) -> Result<StepInfo>
    where
        D: Discretization,
        R: MeshModification<D::Mesh>,
    {
        debug!("adaptation step {step}: target = {target} elements");
        let now = Instant::now();
        let n_elems_init = disc.mesh().n_elems();
        let size = self.target_size(disc, target)?;
        disc.write_snapshot(step)?;
        destroy_stale_fields(disc);
        let params = ModificationParams::default();
        self.modifier.adapt(disc.mesh(), size, &params)?;
        disc.update()?;
        Ok(StepInfo {
            step,
            method: Some(self.method),
            n_elems_init,
            n_elems_final: disc.mesh().n_elems(),
            time: now.elapsed().as_secs_f64(),
        })
    }

    /// Uniform refinement fallback: no size field is computed
    pub fn uniform_refine<D>(&mut self, disc: &mut D, step: usize) -> Result<StepInfo>
    where
        D: Discretization,
        R: MeshModification<D::Mesh>,
    {
        debug!("uniform refinement step {step}");
        let now = Instant::now();
        let n_elems_init = disc.mesh().n_elems();
        disc.write_snapshot(step)?;
        destroy_stale_fields(disc);
        self.modifier.uniform_refine(disc.mesh())?;
        disc.update()?;
        disc.write_snapshot(step + 1)?;
        Ok(StepInfo {
            step,
            method: None,
            n_elems_init,
            n_elems_final: disc.mesh().n_elems(),
            time: now.elapsed().as_secs_f64(),
        })
    }
}

/// Destroy the fixed list of fields that the mesh modification invalidates
fn destroy_stale_fields<D: Discretization>(disc: &mut D) {
    debug!("destroy the stale solution and estimator fields");
    for tag in FieldTag::STALE {
        disc.destroy_field(tag);
    }
}

#[cfg(test)]
mod tests {
    use super::{
        Adapter, Discretization, FieldTag, MeshModification, Method, ModificationParams, StepInfo,
    };
    use crate::{
        field::{ErrorField, VertexSizeField},
        mesh::{test_meshes::test_mesh_2d, test_meshes::TestMesh, Mesh},
        parallel::SerialComm,
        size::SizeParams,
        Result,
    };
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<String>>>;

    struct TestDisc {
        mesh: TestMesh,
        vms1: Option<ErrorField>,
        vms2: Option<ErrorField>,
        spr: Option<ErrorField>,
        log: Log,
    }

    impl TestDisc {
        fn new(log: Log) -> Self {
            let mesh = test_mesh_2d().split();
            let n_elems = mesh.n_elems();
            let uniform = || Some(ErrorField::from_indicator(vec![1.0; n_elems]));
            Self {
                mesh,
                vms1: uniform(),
                vms2: uniform(),
                spr: uniform(),
                log,
            }
        }
    }

    impl Discretization for TestDisc {
        type Mesh = TestMesh;

        fn mesh(&mut self) -> &mut TestMesh {
            &mut self.mesh
        }

        fn vms_error_1(&mut self) -> Option<ErrorField> {
            self.vms1.take()
        }

        fn vms_error_2(&mut self) -> Option<ErrorField> {
            self.vms2.take()
        }

        fn recovered_error(&mut self) -> Option<ErrorField> {
            self.spr.take()
        }

        fn write_snapshot(&mut self, step: usize) -> Result<()> {
            self.log.borrow_mut().push(format!("snapshot {step}"));
            Ok(())
        }

        fn destroy_field(&mut self, tag: FieldTag) {
            self.log.borrow_mut().push(format!("destroy {tag:?}"));
        }

        fn update(&mut self) -> Result<()> {
            self.log.borrow_mut().push("update".to_string());
            Ok(())
        }
    }

    struct TestModifier {
        log: Log,
    }

    impl MeshModification<TestMesh> for TestModifier {
        fn adapt(
            &mut self,
            mesh: &mut TestMesh,
            size: VertexSizeField,
            params: &ModificationParams,
        ) -> Result<()> {
            self.log.borrow_mut().push(format!(
                "modify field={} iters={} coarsen={}",
                size.name(),
                params.max_iterations,
                params.coarsen
            ));
            *mesh = mesh.split();
            Ok(())
        }

        fn uniform_refine(&mut self, mesh: &mut TestMesh) -> Result<()> {
            self.log.borrow_mut().push("uniform".to_string());
            *mesh = mesh.split();
            Ok(())
        }
    }

    fn new_adapter(method: Method, log: &Log) -> Adapter<SerialComm, TestModifier> {
        let modifier = TestModifier { log: log.clone() };
        Adapter::new(method, SizeParams::default(), SerialComm, modifier)
    }

    fn expected_destroys() -> Vec<String> {
        FieldTag::STALE
            .iter()
            .map(|tag| format!("destroy {tag:?}"))
            .collect()
    }

    #[test]
    fn test_adapt_lifecycle_order() -> Result<()> {
        let log: Log = Log::default();
        let mut disc = TestDisc::new(log.clone());
        let mut adapter = new_adapter(Method::Vms1, &log);
        let info = adapter.adapt(&mut disc, 10, 0)?;

        let mut expected = vec!["snapshot 0".to_string()];
        expected.extend(expected_destroys());
        expected.push("modify field=size iters=1 coarsen=true".to_string());
        expected.push("update".to_string());
        assert_eq!(*log.borrow(), expected);

        assert_eq!(info.step, 0);
        assert_eq!(info.method, Some(Method::Vms1));
        assert_eq!(info.n_elems_init, 8);
        assert_eq!(info.n_elems_final, 32);
        // the other estimator outputs were not consumed
        assert!(disc.vms2.is_some() && disc.spr.is_some());
        Ok(())
    }

    #[test]
    fn test_min_method_consumes_all_estimators() -> Result<()> {
        let log: Log = Log::default();
        let mut disc = TestDisc::new(log.clone());
        let mut adapter = new_adapter(Method::Min, &log);
        adapter.adapt(&mut disc, 10, 3)?;
        assert!(disc.vms1.is_none() && disc.vms2.is_none() && disc.spr.is_none());
        assert!(log
            .borrow()
            .contains(&"modify field=min_size iters=1 coarsen=true".to_string()));
        Ok(())
    }

    #[test]
    fn test_missing_estimator_is_fatal() {
        let log: Log = Log::default();
        let mut disc = TestDisc::new(log.clone());
        disc.vms2 = None;
        let mut adapter = new_adapter(Method::Vms2, &log);
        assert!(adapter.adapt(&mut disc, 10, 0).is_err());
        // the failure happens at dispatch, before any snapshot or cleanup
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_uniform_refinement_path() -> Result<()> {
        let log: Log = Log::default();
        let mut disc = TestDisc::new(log.clone());
        let mut adapter = new_adapter(Method::Spr, &log);
        let info = adapter.uniform_refine(&mut disc, 2)?;

        let mut expected = vec!["snapshot 2".to_string()];
        expected.extend(expected_destroys());
        expected.push("uniform".to_string());
        expected.push("update".to_string());
        expected.push("snapshot 3".to_string());
        assert_eq!(*log.borrow(), expected);

        assert_eq!(info.method, None);
        // uniform subdivision of a 2d mesh multiplies the element count by 4
        assert_eq!(info.n_elems_final, 4 * info.n_elems_init);
        // no estimator output was consumed
        assert!(disc.vms1.is_some() && disc.vms2.is_some() && disc.spr.is_some());
        Ok(())
    }

    #[test]
    fn test_method_from_str() {
        assert_eq!("spr".parse::<Method>().unwrap(), Method::Spr);
        assert_eq!("vms1".parse::<Method>().unwrap(), Method::Vms1);
        assert_eq!("vms2".parse::<Method>().unwrap(), Method::Vms2);
        assert_eq!("min".parse::<Method>().unwrap(), Method::Min);
        assert!("other".parse::<Method>().is_err());
    }

    #[test]
    fn test_step_info_json() {
        let info = StepInfo {
            step: 1,
            method: Some(Method::Min),
            n_elems_init: 8,
            n_elems_final: 32,
            time: 0.1,
        };
        let json = info.to_json();
        assert!(json.contains("\"method\": \"min\""));
        assert!(json.contains("\"n_elems_final\": 32"));
    }
}
