//! 开发机构层：状态机、校验策略、机构注册表与全有或全无提交

pub mod commit;
pub mod development;
pub mod policy;
pub mod registry;

pub use commit::commit_files;
pub use development::{AgencyState, DevelopmentAgency};
pub use policy::{
    policy_from_name, AllOf, ContainsText, DescriptionMarker, FunctionsDefined, VerificationPolicy,
};
pub use registry::{AgencyHandle, AgencyRegistry};
