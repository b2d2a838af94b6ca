/*!
 * Protocol layer: what we put on the wire and where it goes.
 *
 * - `message`: the opaque, pre-formatted payload
 * - `endpoint`: the collector's (host, port), resolved lazily
 * - `constants`: line terminator and built-in defaults
 */

pub mod constants;
pub mod endpoint;
pub mod message;
