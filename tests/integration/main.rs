mod coordination_tests;
mod graft_properties;
mod support;
