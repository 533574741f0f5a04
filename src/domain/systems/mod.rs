// Simulation systems driven once per tick by the world.

pub mod flight;
