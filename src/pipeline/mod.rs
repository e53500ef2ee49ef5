// Processing stages that turn the flat export into related tables
pub mod normalize;
