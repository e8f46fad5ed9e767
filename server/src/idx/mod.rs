/*
 * This file is a part of kvd
*/

//! The two leaf index structures the rest of the server is built on:
//! an order-statistic AVL tree ([`avl`]) and a progressive-rehash
//! chained hash map ([`hmap`]). Both operate on an arena the caller
//! owns, addressed by `u32` slot ids — see `spec.md` §9 and
//! `SPEC_FULL.md` for why these aren't intrusive pointer structures.

pub mod avl;
pub mod hmap;
